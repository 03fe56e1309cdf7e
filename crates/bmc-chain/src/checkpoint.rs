//! Line-oriented, tab-separated checkpoint files.
//!
//! Layout, one record per line:
//!
//! ```text
//! rng\t<word>...
//! state\t<step>
//! lnL\t<log posterior>
//! parameter\t<name>\t<dimension>\t<value>...
//! operator\t<name>\t<accepted>\t<rejected>[\t<tunable>]
//! tree\t<name>
//! <node count>
//! <id>\t<height>[\t<taxon>]
//! <edge count>
//! <child id>\t<parent id>[\t<trait value>...]
//! ```
//!
//! Lines starting with `#` are comments. Doubles are written as shortest
//! round-trip text, or as `<text>/<hex bits>` in full-precision mode; the
//! reader accepts both per field.
//!
//! Restoring is fail closed: the file is parsed completely, matched by name
//! against the live context, and only then applied. Any failure during
//! application rolls back the state, the schedule and the generator.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use bmc_core::{
    BmcError, ErrorInfo, RngHandle, RngState, Score, TreeGraph, TreeNode, TreeStructure,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CheckpointConfig, RestoreConfig};
use crate::context::SimulationContext;
use crate::schedule::OperatorStats;

/// Parsed parameter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Parameter name.
    pub name: String,
    /// Component values.
    pub values: Vec<f64>,
}

/// Parsed operator record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRecord {
    /// Operator name.
    pub name: String,
    /// Saved counters.
    pub stats: OperatorStats,
    /// Saved tunable, present only for tunable operators.
    pub tunable: Option<f64>,
}

/// Parsed node line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node id.
    pub id: usize,
    /// Node height.
    pub height: f64,
    /// Leaf label.
    pub taxon: Option<String>,
}

/// Parsed edge line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Child node id.
    pub child: usize,
    /// Parent node id.
    pub parent: usize,
    /// Trait values of the edge above `child`.
    pub traits: Vec<f64>,
}

/// Parsed tree block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRecord {
    /// Tree name.
    pub name: String,
    /// Node table.
    pub nodes: Vec<NodeRecord>,
    /// Edge table.
    pub edges: Vec<EdgeRecord>,
}

/// Complete parsed checkpoint, not yet applied to any context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Saved generator position, if recorded.
    pub rng: Option<RngState>,
    /// Step at which the snapshot was taken.
    pub step: u64,
    /// Log posterior at that step.
    pub log_posterior: f64,
    /// Parameter records in file order.
    pub parameters: Vec<ParameterRecord>,
    /// Operator records in file order.
    pub operators: Vec<OperatorRecord>,
    /// Tree blocks in file order.
    pub trees: Vec<TreeRecord>,
}

/// Outcome of a successful restore.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestoredCheckpoint {
    /// Step to resume from.
    pub step: u64,
    /// Log posterior stored in the file.
    pub saved_log_posterior: f64,
    /// Score recomputed from scratch after the restore.
    pub score: Score,
}

/// Encoder/decoder for checkpoint files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointCodec {
    full_precision: bool,
}

impl CheckpointCodec {
    /// Creates a codec; `full_precision` appends the hex bit pattern to every double.
    pub fn new(full_precision: bool) -> Self {
        Self { full_precision }
    }

    /// Serialises the context at `step`.
    pub fn write(
        &self,
        ctx: &SimulationContext,
        step: u64,
        log_posterior: f64,
    ) -> Result<String, BmcError> {
        self.encode(ctx, step, log_posterior).map_err(|_| {
            BmcError::Checkpoint(ErrorInfo::new(
                "checkpoint-write",
                "failed to format checkpoint",
            ))
        })
    }

    fn encode(
        &self,
        ctx: &SimulationContext,
        step: u64,
        log_posterior: f64,
    ) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        out.push_str("rng");
        for word in ctx.rng.state().words() {
            write!(out, "\t{word}")?;
        }
        out.push('\n');
        writeln!(out, "state\t{step}")?;
        writeln!(out, "lnL\t{}", self.double(log_posterior))?;
        for parameter in ctx.state.parameters() {
            write!(out, "parameter\t{}\t{}", parameter.name(), parameter.dimension())?;
            for value in parameter.values() {
                write!(out, "\t{}", self.double(*value))?;
            }
            out.push('\n');
        }
        for entry in ctx.schedule.entries() {
            let stats = entry.stats();
            write!(
                out,
                "operator\t{}\t{}\t{}",
                entry.name(),
                stats.accepted,
                stats.rejected
            )?;
            if let Some(tunable) = entry.operator().tunable() {
                write!(out, "\t{}", self.double(tunable))?;
            }
            out.push('\n');
        }
        for tree in ctx.state.trees() {
            self.encode_tree(&mut out, tree)?;
        }
        Ok(out)
    }

    fn encode_tree(&self, out: &mut String, tree: &TreeGraph) -> std::fmt::Result {
        writeln!(out, "tree\t{}", tree.name())?;
        writeln!(out, "#node height taxon")?;
        writeln!(out, "{}", tree.node_count())?;
        for (id, node) in tree.nodes().iter().enumerate() {
            write!(out, "{id}\t{}", self.double(node.height))?;
            if let Some(taxon) = &node.taxon {
                write!(out, "\t{taxon}")?;
            }
            out.push('\n');
        }
        write!(out, "#child parent")?;
        for name in tree.trait_names() {
            write!(out, " {name}")?;
        }
        out.push('\n');
        let edges: Vec<(usize, usize)> = tree.edges().collect();
        writeln!(out, "{}", edges.len())?;
        for (child, parent) in edges {
            write!(out, "{child}\t{parent}")?;
            for value in tree.edge_traits(child) {
                write!(out, "\t{}", self.double(*value))?;
            }
            out.push('\n');
        }
        Ok(())
    }

    fn double(&self, value: f64) -> String {
        if self.full_precision {
            format!("{value}/{:016x}", value.to_bits())
        } else {
            format!("{value}")
        }
    }

    /// Parses checkpoint text without touching any live state.
    pub fn parse(&self, text: &str) -> Result<Checkpoint, BmcError> {
        Parser::new(text).checkpoint()
    }

    /// Parses `text` and applies it to `ctx`.
    pub fn read(
        &self,
        ctx: &mut SimulationContext,
        text: &str,
        restore: &RestoreConfig,
    ) -> Result<RestoredCheckpoint, BmcError> {
        let checkpoint = self.parse(text)?;
        self.restore(ctx, &checkpoint, restore)
    }

    /// Validates `checkpoint` against `ctx` by name, then applies it.
    ///
    /// On any error the context is left exactly as it was.
    pub fn restore(
        &self,
        ctx: &mut SimulationContext,
        checkpoint: &Checkpoint,
        restore: &RestoreConfig,
    ) -> Result<RestoredCheckpoint, BmcError> {
        let plan = RestorePlan::build(ctx, checkpoint, restore)?;

        let saved_state = ctx.state.clone();
        let saved_schedule = ctx.schedule.snapshot();
        let saved_rng = ctx.rng.clone();

        match apply(ctx, checkpoint, plan, restore) {
            Ok(restored) => Ok(restored),
            Err(err) => {
                ctx.state = saved_state;
                ctx.schedule.restore_snapshot(&saved_schedule);
                ctx.rng = saved_rng;
                ctx.objective.mark_dirty();
                Err(err)
            }
        }
    }

    /// Writes a checkpoint file, creating parent directories.
    pub fn write_file(
        &self,
        ctx: &SimulationContext,
        step: u64,
        log_posterior: f64,
        path: &Path,
    ) -> Result<(), BmcError> {
        let text = self.write(ctx, step, log_posterior)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BmcError::Checkpoint(
                    ErrorInfo::new("checkpoint-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        fs::write(path, text).map_err(|err| {
            BmcError::Checkpoint(
                ErrorInfo::new("checkpoint-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a checkpoint file without applying it.
    pub fn load_file(&self, path: &Path) -> Result<Checkpoint, BmcError> {
        let text = fs::read_to_string(path).map_err(|err| {
            BmcError::Checkpoint(
                ErrorInfo::new("checkpoint-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        self.parse(&text).map_err(|err| match err {
            BmcError::Checkpoint(info) => {
                BmcError::Checkpoint(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Loads and applies a checkpoint file.
    pub fn read_file(
        &self,
        ctx: &mut SimulationContext,
        path: &Path,
        restore: &RestoreConfig,
    ) -> Result<RestoredCheckpoint, BmcError> {
        let checkpoint = self.load_file(path)?;
        self.restore(ctx, &checkpoint, restore)
    }
}

/// Deterministic checkpoint file name for `step`.
pub fn checkpoint_path(root: &Path, step: u64) -> PathBuf {
    root.join(format!("ckpt_{step:08}.state"))
}

// Name-indexed pairing of records with live objects.
struct RestorePlan {
    operators: Vec<(usize, usize)>,
    trees: Vec<(String, TreeStructure)>,
}

impl RestorePlan {
    fn build(
        ctx: &SimulationContext,
        checkpoint: &Checkpoint,
        restore: &RestoreConfig,
    ) -> Result<Self, BmcError> {
        for record in &checkpoint.parameters {
            if ctx.state.parameter(&record.name).is_err() {
                return Err(checkpoint_error(
                    "parameter-unknown",
                    "checkpoint names a parameter the model does not have",
                )
                .with_context("parameter", record.name.clone())
                .into());
            }
        }
        for parameter in ctx.state.parameters() {
            if !checkpoint.parameters.iter().any(|r| r.name == parameter.name()) {
                return Err(checkpoint_error(
                    "parameter-missing",
                    "model parameter not found in checkpoint",
                )
                .with_context("parameter", parameter.name().to_string())
                .into());
            }
        }

        let mut operators = Vec::with_capacity(checkpoint.operators.len());
        for (record_index, record) in checkpoint.operators.iter().enumerate() {
            let Some(index) = ctx.schedule.position(&record.name) else {
                return Err(operator_mismatch("checkpoint names an unknown operator", &record.name));
            };
            let live_tunable = ctx.schedule.entry(index)?.operator().tunable();
            if live_tunable.is_some() != record.tunable.is_some() {
                return Err(operator_mismatch(
                    "tunable presence differs between checkpoint and schedule",
                    &record.name,
                ));
            }
            operators.push((record_index, index));
        }
        for entry in ctx.schedule.entries() {
            if !checkpoint.operators.iter().any(|r| r.name == entry.name()) {
                return Err(operator_mismatch("operator not found in checkpoint", entry.name()));
            }
        }

        let mut trees = Vec::with_capacity(checkpoint.trees.len());
        for record in &checkpoint.trees {
            let live = ctx.state.tree(&record.name).map_err(|_| {
                BmcError::from(
                    checkpoint_error("tree-unknown", "checkpoint names an unknown tree")
                        .with_context("tree", record.name.clone()),
                )
            })?;
            trees.push((record.name.clone(), tree_structure(live, record)?));
        }
        for tree in ctx.state.trees() {
            if !checkpoint.trees.iter().any(|r| r.name == tree.name()) {
                return Err(checkpoint_error("tree-missing", "model tree not found in checkpoint")
                    .with_context("tree", tree.name().to_string())
                    .into());
            }
        }

        if restore.checkpoint_seed.is_none() {
            if let Some(rng) = &checkpoint.rng {
                RngHandle::from_state(rng)?;
            }
        }
        Ok(Self { operators, trees })
    }
}

fn tree_structure(live: &TreeGraph, record: &TreeRecord) -> Result<TreeStructure, BmcError> {
    let count = record.nodes.len();
    let mut nodes: Vec<Option<TreeNode>> = vec![None; count];
    for node in &record.nodes {
        let slot = nodes.get_mut(node.id).ok_or_else(|| {
            tree_error(&record.name, "node id out of range").with_context("node", node.id.to_string())
        })?;
        if slot.is_some() {
            return Err(tree_error(&record.name, "duplicate node id")
                .with_context("node", node.id.to_string())
                .into());
        }
        *slot = Some(TreeNode {
            height: node.height,
            taxon: node.taxon.clone(),
        });
    }
    let nodes: Vec<TreeNode> = nodes.into_iter().flatten().collect();

    let columns = live.trait_names().len();
    let mut parents = vec![None; count];
    let mut traits = vec![vec![0.0; columns]; count];
    for edge in &record.edges {
        if edge.child >= count || edge.parent >= count {
            return Err(tree_error(&record.name, "edge references an unknown node")
                .with_context("child", edge.child.to_string())
                .with_context("parent", edge.parent.to_string())
                .into());
        }
        if parents[edge.child].is_some() {
            return Err(tree_error(&record.name, "node has two parents")
                .with_context("node", edge.child.to_string())
                .into());
        }
        if edge.traits.len() != columns {
            return Err(tree_error(&record.name, "edge trait count differs from model")
                .with_context("expected", columns.to_string())
                .with_context("found", edge.traits.len().to_string())
                .into());
        }
        parents[edge.child] = Some(edge.parent);
        traits[edge.child] = edge.traits.clone();
    }
    // The root carries no edge record; keep the live root row.
    if let Some(root) = parents.iter().position(Option::is_none) {
        let live_row = live.edge_traits(live.root());
        if live_row.len() == columns {
            traits[root] = live_row.to_vec();
        }
    }
    Ok(TreeStructure {
        nodes,
        parents,
        traits,
    })
}

fn apply(
    ctx: &mut SimulationContext,
    checkpoint: &Checkpoint,
    plan: RestorePlan,
    restore: &RestoreConfig,
) -> Result<RestoredCheckpoint, BmcError> {
    for record in &checkpoint.parameters {
        let parameter = ctx.state.parameter_mut(&record.name)?;
        if parameter.dimension() != record.values.len() {
            warn!(
                parameter = %record.name,
                live = parameter.dimension(),
                saved = record.values.len(),
                "parameter dimension differs from checkpoint; restoring overlapping components"
            );
        }
        let overlap = parameter.dimension().min(record.values.len());
        for (index, value) in record.values.iter().take(overlap).enumerate() {
            parameter.set_value(index, *value)?;
        }
    }

    for (record_index, schedule_index) in plan.operators {
        let record = &checkpoint.operators[record_index];
        ctx.schedule.set_stats(schedule_index, record.stats)?;
        if let Some(tunable) = record.tunable {
            ctx.schedule
                .entry_mut(schedule_index)?
                .operator_mut()
                .set_tunable(tunable);
        }
    }

    for (name, structure) in plan.trees {
        let tree = ctx.state.tree_mut(&name)?;
        tree.edit(|tree| tree.adopt_structure(structure))
            .map_err(|err| match err {
                BmcError::Model(info) if info.code == "tree-structure" => {
                    BmcError::Checkpoint(info)
                }
                other => other,
            })?;
    }

    match (restore.checkpoint_seed, &checkpoint.rng) {
        (Some(seed), _) => {
            info!(seed, "reseeding generator instead of restoring saved stream");
            ctx.rng = RngHandle::from_seed(seed);
        }
        (None, Some(state)) => ctx.rng = RngHandle::from_state(state)?,
        (None, None) => {}
    }

    let score = ctx.evaluate_full()?;
    check_log_posterior(checkpoint.log_posterior, score.log_posterior, restore)?;
    Ok(RestoredCheckpoint {
        step: checkpoint.step,
        saved_log_posterior: checkpoint.log_posterior,
        score,
    })
}

/// Relative difference below which a saved and a recomputed log posterior
/// count as the same number: roughly 15 shared significant digits.
const SIGNIFICANT_AGREEMENT: f64 = 1e-14;

fn check_log_posterior(saved: f64, recomputed: f64, restore: &RestoreConfig) -> Result<(), BmcError> {
    if saved == recomputed {
        return Ok(());
    }
    let difference = (saved - recomputed).abs();
    let scale = saved.abs().max(recomputed.abs());
    if difference.is_finite() && difference <= SIGNIFICANT_AGREEMENT * scale {
        debug!(saved, recomputed, "restored log posterior agrees to rounding");
        return Ok(());
    }
    if restore.force_resume {
        warn!(saved, recomputed, "forcing resume despite log posterior mismatch");
        return Ok(());
    }
    if difference <= restore.lnl_tolerance {
        warn!(
            saved,
            recomputed,
            tolerance = restore.lnl_tolerance,
            "restored log posterior differs within tolerance; continuing"
        );
        return Ok(());
    }
    Err(BmcError::Checkpoint(
        ErrorInfo::new(
            "lnl-mismatch",
            "saved log posterior does not match recomputed value",
        )
        .with_context("saved", saved.to_string())
        .with_context("recomputed", recomputed.to_string())
        .with_hint("resume with the original seed, or set restore.force_resume"),
    ))
}

struct Parser<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }

    fn next_line(&mut self) -> Option<(usize, Vec<&'a str>)> {
        for (index, line) in self.lines.by_ref() {
            let trimmed = line.trim_end_matches('\r');
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some((index + 1, trimmed.split('\t').collect()));
        }
        None
    }

    fn expect_line(&mut self, what: &str) -> Result<(usize, Vec<&'a str>), BmcError> {
        self.next_line().ok_or_else(|| {
            checkpoint_error("checkpoint-truncated", "checkpoint ended early")
                .with_context("expected", what.to_string())
                .into()
        })
    }

    fn checkpoint(mut self) -> Result<Checkpoint, BmcError> {
        let (mut line_no, mut fields) = self.expect_line("state")?;
        let mut rng = None;
        if fields[0] == "rng" {
            let words = fields[1..]
                .iter()
                .map(|field| field.parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| record_error("rng-record", "unreadable rng word", line_no))?;
            rng = Some(RngState::from_words(words));
            (line_no, fields) = self.expect_line("state")?;
        }

        if fields.len() != 2 || fields[0] != "state" {
            return Err(record_error("state-record", "expected state record", line_no));
        }
        let step = fields[1]
            .parse::<u64>()
            .map_err(|_| record_error("state-record", "unreadable step", line_no))?;

        let (line_no, fields) = self.expect_line("lnL")?;
        if fields.len() != 2 || fields[0] != "lnL" {
            return Err(record_error("lnl-record", "expected lnL record", line_no));
        }
        let log_posterior = parse_double(fields[1])
            .ok_or_else(|| record_error("lnl-record", "unreadable log posterior", line_no))?;

        let mut checkpoint = Checkpoint {
            rng,
            step,
            log_posterior,
            parameters: Vec::new(),
            operators: Vec::new(),
            trees: Vec::new(),
        };

        while let Some((line_no, fields)) = self.next_line() {
            match fields[0] {
                "parameter" => checkpoint.parameters.push(parameter_record(&fields, line_no)?),
                "operator" => checkpoint.operators.push(operator_record(&fields, line_no)?),
                "tree" => {
                    if fields.len() != 2 {
                        return Err(record_error("malformed-record", "expected tree name", line_no));
                    }
                    let tree = self.tree_block(fields[1])?;
                    checkpoint.trees.push(tree);
                }
                other => {
                    return Err(checkpoint_error("malformed-record", "unknown record type")
                        .with_context("line", line_no.to_string())
                        .with_context("record", other.to_string())
                        .into())
                }
            }
        }
        Ok(checkpoint)
    }

    fn count(&mut self, what: &str) -> Result<usize, BmcError> {
        let (line_no, fields) = self.expect_line(what)?;
        if fields.len() != 1 {
            return Err(record_error("malformed-record", "expected a count", line_no));
        }
        fields[0]
            .parse()
            .map_err(|_| record_error("malformed-record", "unreadable count", line_no))
    }

    fn tree_block(&mut self, name: &str) -> Result<TreeRecord, BmcError> {
        let node_count = self.count("node count")?;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let (line_no, fields) = self.expect_line("node")?;
            if fields.len() < 2 || fields.len() > 3 {
                return Err(record_error("malformed-record", "expected node line", line_no));
            }
            let id = fields[0]
                .parse()
                .map_err(|_| record_error("malformed-record", "unreadable node id", line_no))?;
            let height = parse_double(fields[1])
                .ok_or_else(|| record_error("malformed-record", "unreadable node height", line_no))?;
            nodes.push(NodeRecord {
                id,
                height,
                taxon: fields.get(2).map(|taxon| taxon.to_string()),
            });
        }
        let edge_count = self.count("edge count")?;
        let mut edges = Vec::with_capacity(edge_count);
        for _ in 0..edge_count {
            let (line_no, fields) = self.expect_line("edge")?;
            if fields.len() < 2 {
                return Err(record_error("malformed-record", "expected edge line", line_no));
            }
            let child = fields[0]
                .parse()
                .map_err(|_| record_error("malformed-record", "unreadable child id", line_no))?;
            let parent = fields[1]
                .parse()
                .map_err(|_| record_error("malformed-record", "unreadable parent id", line_no))?;
            let traits = fields[2..]
                .iter()
                .map(|field| parse_double(field))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| record_error("malformed-record", "unreadable trait value", line_no))?;
            edges.push(EdgeRecord {
                child,
                parent,
                traits,
            });
        }
        Ok(TreeRecord {
            name: name.to_string(),
            nodes,
            edges,
        })
    }
}

fn parameter_record(fields: &[&str], line_no: usize) -> Result<ParameterRecord, BmcError> {
    if fields.len() < 3 {
        return Err(record_error("malformed-record", "expected parameter name and dimension", line_no));
    }
    let dimension: usize = fields[2]
        .parse()
        .map_err(|_| record_error("malformed-record", "unreadable parameter dimension", line_no))?;
    let values = fields[3..]
        .iter()
        .map(|field| parse_double(field))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| record_error("malformed-record", "unreadable parameter value", line_no))?;
    if values.len() != dimension {
        return Err(checkpoint_error("malformed-record", "parameter value count differs from dimension")
            .with_context("line", line_no.to_string())
            .with_context("parameter", fields[1].to_string())
            .into());
    }
    Ok(ParameterRecord {
        name: fields[1].to_string(),
        values,
    })
}

fn operator_record(fields: &[&str], line_no: usize) -> Result<OperatorRecord, BmcError> {
    if fields.len() < 4 || fields.len() > 5 {
        return Err(record_error("operator-mismatch", "expected operator record", line_no));
    }
    let name = fields[1];
    let count = |field: &str, what: &str| {
        field.parse::<u64>().map_err(|_| {
            BmcError::from(
                checkpoint_error("operator-mismatch", format!("unreadable {what} count"))
                    .with_context("line", line_no.to_string())
                    .with_context("operator", name.to_string())
                    .with_context("value", field.to_string()),
            )
        })
    };
    let accepted = count(fields[2], "accept")?;
    let rejected = count(fields[3], "reject")?;
    let tunable = match fields.get(4) {
        Some(field) => Some(parse_double(field).ok_or_else(|| {
            BmcError::from(
                checkpoint_error("operator-mismatch", "unreadable tunable")
                    .with_context("line", line_no.to_string())
                    .with_context("operator", name.to_string()),
            )
        })?),
        None => None,
    };
    Ok(OperatorRecord {
        name: name.to_string(),
        stats: OperatorStats { accepted, rejected },
        tunable,
    })
}

/// Reads `text` or `text/hexbits`; the hex form wins when present.
fn parse_double(field: &str) -> Option<f64> {
    match field.split_once('/') {
        Some((_, bits)) => u64::from_str_radix(bits, 16).ok().map(f64::from_bits),
        None => field.parse().ok(),
    }
}

struct CheckpointFault(ErrorInfo);

impl CheckpointFault {
    fn with_context(self, key: &str, value: String) -> Self {
        CheckpointFault(self.0.with_context(key, value))
    }
}

impl From<CheckpointFault> for BmcError {
    fn from(fault: CheckpointFault) -> Self {
        BmcError::Checkpoint(fault.0)
    }
}

fn checkpoint_error(code: &str, message: impl Into<String>) -> CheckpointFault {
    CheckpointFault(ErrorInfo::new(code, message))
}

fn record_error(code: &str, message: &str, line_no: usize) -> BmcError {
    checkpoint_error(code, message)
        .with_context("line", line_no.to_string())
        .into()
}

fn operator_mismatch(message: &str, operator: &str) -> BmcError {
    checkpoint_error("operator-mismatch", message)
        .with_context("operator", operator.to_string())
        .into()
}

fn tree_error(tree: &str, message: &str) -> CheckpointFault {
    checkpoint_error("tree-structure", message).with_context("tree", tree.to_string())
}

/// Writes periodic and final checkpoint files for a running chain.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    codec: CheckpointCodec,
    config: CheckpointConfig,
    directory: PathBuf,
    written: Vec<PathBuf>,
    last_step: Option<u64>,
}

impl CheckpointWriter {
    /// Creates a writer targeting `directory`.
    pub fn new(config: CheckpointConfig, directory: PathBuf) -> Self {
        Self {
            codec: CheckpointCodec::new(config.full_precision),
            config,
            directory,
            written: Vec::new(),
            last_step: None,
        }
    }

    /// Files currently retained, oldest first.
    pub fn paths(&self) -> &[PathBuf] {
        &self.written
    }

    /// Writes a checkpoint if one is due after `step` completed steps.
    pub fn maybe_write(
        &mut self,
        ctx: &SimulationContext,
        step: u64,
        log_posterior: f64,
    ) -> Result<(), BmcError> {
        if self.config.is_due(step) {
            self.write(ctx, step, log_posterior)?;
        }
        Ok(())
    }

    /// Writes the final checkpoint when configured.
    pub fn finish(
        &mut self,
        ctx: &SimulationContext,
        step: u64,
        log_posterior: f64,
    ) -> Result<(), BmcError> {
        if self.config.save_on_finish && self.last_step != Some(step) {
            self.write(ctx, step, log_posterior)?;
        }
        Ok(())
    }

    fn write(
        &mut self,
        ctx: &SimulationContext,
        step: u64,
        log_posterior: f64,
    ) -> Result<(), BmcError> {
        let path = checkpoint_path(&self.directory, step);
        self.codec.write_file(ctx, step, log_posterior, &path)?;
        info!(step, path = %path.display(), "checkpoint written");
        self.last_step = Some(step);
        self.written.push(path);
        enforce_retention(&mut self.written, self.config.max_to_keep)
    }
}

fn enforce_retention(paths: &mut Vec<PathBuf>, max_to_keep: usize) -> Result<(), BmcError> {
    while paths.len() > max_to_keep {
        let path = paths.remove(0);
        fs::remove_file(&path).map_err(|err| {
            BmcError::Checkpoint(
                ErrorInfo::new("checkpoint-remove", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
    }
    Ok(())
}

/// Human-readable summary of a parsed checkpoint.
pub fn describe(checkpoint: &Checkpoint) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "step: {}", checkpoint.step);
    let _ = writeln!(out, "lnL: {}", checkpoint.log_posterior);
    let _ = writeln!(
        out,
        "rng: {}",
        checkpoint
            .rng
            .as_ref()
            .map(|state| format!("{} words", state.words().len()))
            .unwrap_or_else(|| "absent".to_string())
    );
    for parameter in &checkpoint.parameters {
        let _ = writeln!(out, "parameter {} (dim {})", parameter.name, parameter.values.len());
    }
    for operator in &checkpoint.operators {
        let _ = writeln!(
            out,
            "operator {} accepted={} rejected={}{}",
            operator.name,
            operator.stats.accepted,
            operator.stats.rejected,
            operator
                .tunable
                .map(|t| format!(" tunable={t}"))
                .unwrap_or_default()
        );
    }
    for tree in &checkpoint.trees {
        let _ = writeln!(out, "tree {} ({} nodes, {} edges)", tree.name, tree.nodes.len(), tree.edges.len());
    }
    out
}
