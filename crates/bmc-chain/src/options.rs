use bmc_core::{BmcError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Immutable configuration bundle for one chain.
///
/// Construct through [`ChainOptions::builder`]; fields cannot be changed
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOptions {
    chain_length: u64,
    #[serde(default = "default_full_evaluation_count")]
    full_evaluation_count: u64,
    #[serde(default = "default_min_operator_count")]
    min_operator_count_for_full_evaluation: u64,
    #[serde(default = "default_evaluation_threshold")]
    evaluation_test_threshold: f64,
    #[serde(default)]
    coercion_delay: Option<u64>,
    #[serde(default = "default_use_coercion")]
    use_coercion: bool,
    #[serde(default = "default_adaptation_target")]
    adaptation_target: f64,
    #[serde(default = "default_temperature")]
    temperature: f64,
}

fn default_full_evaluation_count() -> u64 {
    2000
}

fn default_min_operator_count() -> u64 {
    1
}

fn default_evaluation_threshold() -> f64 {
    1e-6
}

fn default_use_coercion() -> bool {
    true
}

fn default_adaptation_target() -> f64 {
    0.234
}

fn default_temperature() -> f64 {
    1.0
}

impl Default for ChainOptions {
    fn default() -> Self {
        ChainOptions::builder(10_000).options
    }
}

impl ChainOptions {
    /// Starts a builder for a chain of `chain_length` steps.
    pub fn builder(chain_length: u64) -> ChainOptionsBuilder {
        ChainOptionsBuilder {
            options: ChainOptions {
                chain_length,
                full_evaluation_count: default_full_evaluation_count(),
                min_operator_count_for_full_evaluation: default_min_operator_count(),
                evaluation_test_threshold: default_evaluation_threshold(),
                coercion_delay: None,
                use_coercion: default_use_coercion(),
                adaptation_target: default_adaptation_target(),
                temperature: default_temperature(),
            },
        }
    }

    /// Total number of steps.
    pub fn chain_length(&self) -> u64 {
        self.chain_length
    }

    /// Drift-check cadence in steps; zero disables the check.
    pub fn full_evaluation_count(&self) -> u64 {
        self.full_evaluation_count
    }

    /// Minimum accept+reject count every operator must reach before drift checks start.
    pub fn min_operator_count_for_full_evaluation(&self) -> u64 {
        self.min_operator_count_for_full_evaluation
    }

    /// Maximum tolerated gap between incremental and full evaluation.
    pub fn evaluation_test_threshold(&self) -> f64 {
        self.evaluation_test_threshold
    }

    /// Whether adaptive tuning is enabled.
    pub fn use_coercion(&self) -> bool {
        self.use_coercion
    }

    /// Target acceptance probability for coercible operators.
    pub fn adaptation_target(&self) -> f64 {
        self.adaptation_target
    }

    /// Tempering scalar applied by the acceptance criterion.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Explicit delay if given, else `chain_length / 100` when adaptation is on.
    pub fn coercion_delay(&self) -> u64 {
        match self.coercion_delay {
            Some(delay) => delay,
            None if self.use_coercion => self.chain_length / 100,
            None => 0,
        }
    }

    /// Checks value ranges; called by the builder and after deserialisation.
    pub fn validate(&self) -> Result<(), BmcError> {
        self.check_ranges().map_err(BmcError::from)
    }

    fn check_ranges(&self) -> Result<(), Invalid> {
        if self.chain_length == 0 {
            return Err(invalid("invalid-chain-length", "chain length must be positive"));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(invalid("invalid-temperature", "temperature must be positive")
                .with_value(self.temperature));
        }
        if !(self.adaptation_target > 0.0 && self.adaptation_target < 1.0) {
            return Err(
                invalid("invalid-adaptation-target", "target acceptance must lie in (0, 1)")
                    .with_value(self.adaptation_target),
            );
        }
        if !(self.evaluation_test_threshold >= 0.0) {
            return Err(
                invalid("invalid-threshold", "evaluation threshold must be non-negative")
                    .with_value(self.evaluation_test_threshold),
            );
        }
        Ok(())
    }
}

/// Consuming builder for [`ChainOptions`].
#[derive(Debug, Clone)]
pub struct ChainOptionsBuilder {
    options: ChainOptions,
}

impl ChainOptionsBuilder {
    /// Drift-check cadence; zero disables.
    pub fn full_evaluation_count(mut self, count: u64) -> Self {
        self.options.full_evaluation_count = count;
        self
    }

    /// Minimum per-operator usage before drift checks begin.
    pub fn min_operator_count_for_full_evaluation(mut self, count: u64) -> Self {
        self.options.min_operator_count_for_full_evaluation = count;
        self
    }

    /// Drift tolerance.
    pub fn evaluation_test_threshold(mut self, threshold: f64) -> Self {
        self.options.evaluation_test_threshold = threshold;
        self
    }

    /// Explicit adaptation window length.
    pub fn coercion_delay(mut self, delay: u64) -> Self {
        self.options.coercion_delay = Some(delay);
        self
    }

    /// Enables or disables adaptation.
    pub fn use_coercion(mut self, enabled: bool) -> Self {
        self.options.use_coercion = enabled;
        self
    }

    /// Target acceptance probability.
    pub fn adaptation_target(mut self, target: f64) -> Self {
        self.options.adaptation_target = target;
        self
    }

    /// Tempering scalar.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.options.temperature = temperature;
        self
    }

    /// Validates and freezes the options.
    pub fn build(self) -> Result<ChainOptions, BmcError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

struct Invalid(ErrorInfo);

impl Invalid {
    fn with_value(self, value: f64) -> Self {
        Invalid(self.0.with_context("value", value.to_string()))
    }
}

impl From<Invalid> for BmcError {
    fn from(invalid: Invalid) -> Self {
        BmcError::Config(invalid.0)
    }
}

fn invalid(code: &str, message: &str) -> Invalid {
    Invalid(ErrorInfo::new(code, message))
}
