use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bmc_core::{BmcError, ChainListener, ChainLogger, ErrorInfo, Score};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::acceptance::AcceptanceCriterion;
use crate::checkpoint::CheckpointWriter;
use crate::coercion::CoercionController;
use crate::context::SimulationContext;
use crate::options::ChainOptions;

/// Lifecycle of a [`ChainRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainPhase {
    /// Constructed or between segments.
    Idle,
    /// Executing steps.
    Running,
    /// A stop request was honoured; waiting for termination.
    Stopping,
    /// `finished` has been delivered; no further steps run.
    Terminated,
}

impl ChainPhase {
    fn encode(self) -> u8 {
        match self {
            ChainPhase::Idle => 0,
            ChainPhase::Running => 1,
            ChainPhase::Stopping => 2,
            ChainPhase::Terminated => 3,
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            1 => ChainPhase::Running,
            2 => ChainPhase::Stopping,
            3 => ChainPhase::Terminated,
            _ => ChainPhase::Idle,
        }
    }
}

#[derive(Debug, Default)]
struct ControlState {
    stop: AtomicBool,
    step: AtomicU64,
    phase: AtomicU8,
}

/// Thread-safe handle for observing and stopping a running chain.
///
/// Clones share the same flags. The stop request is sticky: once set, every
/// later segment halts at its first step boundary.
#[derive(Debug, Clone, Default)]
pub struct ChainControl {
    inner: Arc<ControlState>,
}

impl ChainControl {
    /// Creates a fresh handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the chain to stop at the next step boundary.
    pub fn please_stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    /// Step the chain is currently at.
    pub fn current_step(&self) -> u64 {
        self.inner.step.load(Ordering::Acquire)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ChainPhase {
        ChainPhase::decode(self.inner.phase.load(Ordering::Acquire))
    }

    fn set_step(&self, step: u64) {
        self.inner.step.store(step, Ordering::Release);
    }

    fn set_phase(&self, phase: ChainPhase) {
        self.inner.phase.store(phase.encode(), Ordering::Release);
    }
}

/// What a block of steps does besides sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Adjust coercible tunables after every proposal.
    pub coerce: bool,
    /// Deliver samples to loggers.
    pub log: bool,
}

impl Segment {
    /// Adaptation window of a plain run.
    pub fn adaptive() -> Self {
        Self {
            coerce: true,
            log: true,
        }
    }

    /// Frozen kernel with logging.
    pub fn sampling() -> Self {
        Self {
            coerce: false,
            log: true,
        }
    }

    /// Rung burn-in: tuning without logging.
    pub fn burn_in() -> Self {
        Self {
            coerce: true,
            log: false,
        }
    }

    /// Neither tuning nor logging.
    pub fn silent() -> Self {
        Self {
            coerce: false,
            log: false,
        }
    }
}

/// Result of one [`ChainRunner::run_chain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainOutcome {
    /// Step the segment started at.
    pub start_step: u64,
    /// Step the chain is at after the segment.
    pub end_step: u64,
    /// Whether a stop request cut the segment short.
    pub stopped: bool,
    /// Tracked score at the end of the segment.
    pub score: Score,
}

/// One logged sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Step at which the sample was taken.
    pub step: u64,
    /// Score of the state at that step.
    pub score: Score,
}

struct LoggerSlot {
    logger: Box<dyn ChainLogger>,
    started: bool,
}

/// Drives one Markov chain through `SimulationContext` step by step.
pub struct ChainRunner {
    options: ChainOptions,
    criterion: AcceptanceCriterion,
    coercion: CoercionController,
    control: ChainControl,
    listeners: Vec<Box<dyn ChainListener>>,
    loggers: Vec<LoggerSlot>,
    log_every: u64,
    last_logged: Option<u64>,
    samples: Vec<Sample>,
    checkpoints: Option<CheckpointWriter>,
    current_step: u64,
    current_score: Score,
    initial_score: Option<f64>,
    best_score: f64,
    started: bool,
    finished: bool,
}

impl std::fmt::Debug for ChainRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRunner")
            .field("options", &self.options)
            .field("phase", &self.control.phase())
            .field("current_step", &self.current_step)
            .field("current_score", &self.current_score)
            .field("best_score", &self.best_score)
            .finish()
    }
}

impl ChainRunner {
    /// Creates an idle runner at step zero.
    pub fn new(options: ChainOptions) -> Self {
        Self {
            criterion: AcceptanceCriterion::new(options.temperature()),
            coercion: CoercionController::from_options(&options),
            options,
            control: ChainControl::new(),
            listeners: Vec::new(),
            loggers: Vec::new(),
            log_every: 1000,
            last_logged: None,
            samples: Vec::new(),
            checkpoints: None,
            current_step: 0,
            current_score: Score::impossible(),
            initial_score: None,
            best_score: f64::NEG_INFINITY,
            started: false,
            finished: false,
        }
    }

    /// Sets the sampling interval for loggers and the in-memory sample buffer.
    pub fn with_log_every(mut self, every: u64) -> Self {
        self.log_every = every.max(1);
        self
    }

    /// Options the runner was built with.
    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    /// Adaptation policy.
    pub fn coercion(&self) -> &CoercionController {
        &self.coercion
    }

    /// Shared stop/step/phase handle.
    pub fn control(&self) -> ChainControl {
        self.control.clone()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ChainPhase {
        self.control.phase()
    }

    /// Registers a step-boundary observer.
    pub fn add_listener(&mut self, listener: Box<dyn ChainListener>) {
        self.listeners.push(listener);
    }

    /// Registers a sample sink.
    pub fn add_logger(&mut self, logger: Box<dyn ChainLogger>) {
        self.loggers.push(LoggerSlot {
            logger,
            started: false,
        });
    }

    /// Enables periodic checkpoint files.
    pub fn set_checkpoint_writer(&mut self, writer: CheckpointWriter) {
        self.checkpoints = Some(writer);
    }

    /// Checkpoint files written so far (after retention).
    pub fn checkpoint_paths(&self) -> &[PathBuf] {
        self.checkpoints
            .as_ref()
            .map(CheckpointWriter::paths)
            .unwrap_or(&[])
    }

    /// Step counter; the next step to execute.
    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Positions the chain, used after a checkpoint restore.
    pub fn set_current_step(&mut self, step: u64) {
        self.current_step = step;
        self.control.set_step(step);
    }

    /// Incrementally tracked score.
    pub fn current_score(&self) -> Score {
        self.current_score
    }

    /// Log posterior at step zero, if the chain started there.
    pub fn initial_score(&self) -> Option<f64> {
        self.initial_score
    }

    /// Highest log posterior seen.
    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    /// Drains samples recorded since the last call.
    pub fn take_samples(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }

    /// Runs the full chain length with the adaptation window, then terminates.
    pub fn run(&mut self, ctx: &mut SimulationContext) -> Result<ChainOutcome, BmcError> {
        let coercion = self.coercion.clone();
        let chain_length = self.options.chain_length();
        let outcome = coercion.drive(self, ctx, chain_length);
        let terminated = self.terminate(ctx);
        let outcome = outcome?;
        terminated?;
        Ok(outcome)
    }

    /// Executes up to `length` steps from the current step.
    pub fn run_chain(
        &mut self,
        ctx: &mut SimulationContext,
        length: u64,
        segment: Segment,
    ) -> Result<ChainOutcome, BmcError> {
        if self.finished {
            return Err(BmcError::Config(
                ErrorInfo::new("chain-terminated", "chain already delivered finished")
                    .with_context("step", self.current_step.to_string()),
            ));
        }
        self.control.set_phase(ChainPhase::Running);
        let result = self.run_segment(ctx, length, segment);
        if self.control.phase() == ChainPhase::Running {
            self.control.set_phase(ChainPhase::Idle);
        }
        result
    }

    /// Delivers `finished` exactly once, writes the final checkpoint and
    /// closes loggers.
    pub fn terminate(&mut self, ctx: &mut SimulationContext) -> Result<(), BmcError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let mut first_error = None;
        if let Some(writer) = self.checkpoints.as_mut() {
            if let Err(err) = writer.finish(ctx, self.current_step, self.current_score.log_posterior) {
                first_error.get_or_insert(err);
            }
        }
        for listener in &mut self.listeners {
            if let Err(err) = listener.finished(self.current_step) {
                first_error.get_or_insert(err);
            }
        }
        for slot in &mut self.loggers {
            if slot.started {
                if let Err(err) = slot.logger.stop_logging() {
                    first_error.get_or_insert(err);
                }
                slot.started = false;
            }
        }
        self.control.set_phase(ChainPhase::Terminated);
        debug!(step = self.current_step, "chain terminated");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn run_segment(
        &mut self,
        ctx: &mut SimulationContext,
        length: u64,
        segment: Segment,
    ) -> Result<ChainOutcome, BmcError> {
        let start_step = self.current_step;
        let score = ctx.evaluate_full()?;
        check_initial_score(&score)?;
        self.current_score = score;
        if !self.started {
            self.started = true;
            if start_step == 0 {
                self.initial_score = Some(score.log_posterior);
            }
            self.best_score = score.log_posterior;
            for listener in &mut self.listeners {
                listener.best_state(start_step, &ctx.state, &score);
            }
        }

        let end = start_step + length;
        let mut stopped = false;
        while self.current_step < end {
            let step = self.current_step;
            self.control.set_step(step);
            for listener in &mut self.listeners {
                listener.current_state(step, &ctx.state, &self.current_score)?;
            }
            if segment.log {
                self.log_sample(ctx, step)?;
            }
            if self.control.stop_requested() {
                self.control.set_phase(ChainPhase::Stopping);
                stopped = true;
                break;
            }
            self.step(ctx, step, segment)?;
            self.current_step = step + 1;
            self.control.set_step(self.current_step);
            self.check_drift(ctx)?;
            if let Some(writer) = self.checkpoints.as_mut() {
                writer.maybe_write(ctx, self.current_step, self.current_score.log_posterior)?;
            }
        }
        if !stopped && segment.log {
            self.log_sample(ctx, self.current_step)?;
        }
        Ok(ChainOutcome {
            start_step,
            end_step: self.current_step,
            stopped,
            score: self.current_score,
        })
    }

    fn step(
        &mut self,
        ctx: &mut SimulationContext,
        step: u64,
        segment: Segment,
    ) -> Result<(), BmcError> {
        let index = ctx.schedule.next_index(&mut ctx.rng)?;
        let old_score = self.current_score.log_posterior;

        ctx.objective.store_state();
        let stored = ctx.state.clone();
        let proposal = ctx
            .schedule
            .entry_mut(index)?
            .operator_mut()
            .propose(&mut ctx.state, &mut ctx.rng);

        let mut coerce_ratio = f64::NEG_INFINITY;
        let mut accepted = None;
        match proposal {
            Ok(hastings_ratio) => {
                let mut score = match ctx.evaluate() {
                    Ok(score) => score,
                    Err(err) => {
                        ctx.state = stored;
                        ctx.objective.restore_state();
                        return Err(err);
                    }
                };
                if score.log_posterior == f64::INFINITY || score.log_posterior.is_nan() {
                    warn!(
                        step,
                        operator = ctx.schedule.entry(index)?.name(),
                        diagnosis = %ctx.objective.diagnosis().unwrap_or_default(),
                        "objective returned a numerical error; rejecting"
                    );
                    score.log_posterior = f64::NEG_INFINITY;
                }
                if score.log_posterior > self.best_score {
                    self.best_score = score.log_posterior;
                    for listener in &mut self.listeners {
                        listener.best_state(step, &ctx.state, &score);
                    }
                }
                let accept = if ctx.schedule.entry(index)?.operator().is_gibbs() {
                    true
                } else {
                    let decision = self.criterion.accept(
                        old_score,
                        score.log_posterior,
                        hastings_ratio,
                        &mut ctx.rng,
                    );
                    coerce_ratio = decision.coerced_log_ratio;
                    decision.accepted
                };
                if accept {
                    accepted = Some(score);
                }
            }
            Err(err) if err.is_operator_failure() => {
                debug!(step, error = %err, "operator refused the move");
            }
            Err(err) => {
                ctx.state = stored;
                ctx.objective.restore_state();
                return Err(err);
            }
        }

        match accepted {
            Some(score) => {
                let entry = ctx.schedule.entry_mut(index)?;
                entry
                    .operator_mut()
                    .accept(score.log_posterior - old_score);
                ctx.schedule.record_accept(index)?;
                ctx.objective.accept_state();
                self.current_score = score;
                let name = ctx.schedule.entry(index)?.name();
                for listener in &mut self.listeners {
                    listener.accepted_state(step, name, &ctx.state, &score);
                }
            }
            None => {
                ctx.schedule.entry_mut(index)?.operator_mut().reject();
                ctx.schedule.record_reject(index)?;
                ctx.state = stored;
                ctx.objective.restore_state();
            }
        }

        if segment.coerce {
            self.coercion
                .coerce(&mut ctx.schedule, index, coerce_ratio)?;
        }
        Ok(())
    }

    fn check_drift(&mut self, ctx: &mut SimulationContext) -> Result<(), BmcError> {
        let every = self.options.full_evaluation_count();
        if every == 0 || self.current_step % every != 0 {
            return Ok(());
        }
        if ctx.schedule.minimum_accept_and_reject_count()
            < self.options.min_operator_count_for_full_evaluation()
        {
            return Ok(());
        }
        let tracked = self.current_score.log_posterior;
        let full = ctx.evaluate_full()?.log_posterior;
        let gap = if tracked == full {
            0.0
        } else {
            (full - tracked).abs()
        };
        if gap <= self.options.evaluation_test_threshold() {
            return Ok(());
        }
        error!(
            step = self.current_step,
            incremental = tracked,
            full,
            "incremental log posterior drifted from full evaluation"
        );
        let mut info = ErrorInfo::new(
            "evaluation-drift",
            "incremental and full log-posterior evaluations disagree",
        )
        .with_context("step", self.current_step.to_string())
        .with_context("incremental", tracked.to_string())
        .with_context("full", full.to_string())
        .with_context(
            "threshold",
            self.options.evaluation_test_threshold().to_string(),
        )
        .with_hint("an operator or likelihood component is not updating its cached state");
        if let Some(diagnosis) = ctx.objective.diagnosis() {
            info = info.with_context("diagnosis", diagnosis);
        }
        Err(BmcError::Drift(info))
    }

    fn log_sample(&mut self, ctx: &SimulationContext, step: u64) -> Result<(), BmcError> {
        if step % self.log_every != 0 || self.last_logged == Some(step) {
            return Ok(());
        }
        self.last_logged = Some(step);
        for slot in &mut self.loggers {
            if !slot.started {
                slot.logger.start_logging()?;
                slot.started = true;
            }
            slot.logger.log(step, &ctx.state, &self.current_score)?;
        }
        self.samples.push(Sample {
            step,
            score: self.current_score,
        });
        Ok(())
    }
}

fn check_initial_score(score: &Score) -> Result<(), BmcError> {
    let value = score.log_posterior;
    if value == f64::NEG_INFINITY {
        let (code, message) = if score.log_prior == f64::NEG_INFINITY {
            (
                "initial-prior-zero",
                "the initial model is invalid because one of the priors has zero probability",
            )
        } else {
            ("initial-likelihood-zero", "the initial likelihood is zero")
        };
        return Err(BmcError::Model(ErrorInfo::new(code, message)));
    }
    if value == f64::INFINITY || value.is_nan() {
        return Err(BmcError::Model(
            ErrorInfo::new(
                "initial-numerical-error",
                "the initial log posterior is a numerical error",
            )
            .with_context("log_posterior", value.to_string()),
        ));
    }
    Ok(())
}
