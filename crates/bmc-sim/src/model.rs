use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use bmc_chain::{OperatorSchedule, SimulationContext};
use bmc_core::{
    BmcError, Density, ErrorInfo, Operator, Parameter, PowerPosterior, RngHandle,
    SimulationState, TreeGraph, TreeNode,
};
use serde::{Deserialize, Serialize};

/// Name of the location parameter.
pub const MEAN: &str = "mu";
/// Name of the demo tree.
pub const TREE: &str = "species";

/// Normal observations with unknown mean, plus a caterpillar tree whose root
/// height carries an exponential prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Observed values.
    #[serde(default = "default_observations")]
    pub observations: Vec<f64>,
    /// Prior mean of `mu`.
    #[serde(default)]
    pub prior_mean: f64,
    /// Prior standard deviation of `mu`.
    #[serde(default = "default_prior_sd")]
    pub prior_sd: f64,
    /// Known observation noise.
    #[serde(default = "default_noise_sd")]
    pub noise_sd: f64,
    /// Leaf labels; at least two.
    #[serde(default = "default_taxa")]
    pub taxa: Vec<String>,
    /// Height gap between consecutive internal nodes.
    #[serde(default = "default_node_spacing")]
    pub node_spacing: f64,
    /// Rate of the exponential root-height prior.
    #[serde(default = "default_height_rate")]
    pub height_rate: f64,
    /// Initial half-width of the `mu` random walk.
    #[serde(default = "default_mean_window")]
    pub mean_window: f64,
    /// Initial log-scale range of the root-height scale move.
    #[serde(default = "default_height_scale")]
    pub height_scale: f64,
    /// Selection weights; zero drops the operator.
    #[serde(default)]
    pub weights: OperatorWeights,
}

/// Per-operator selection weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorWeights {
    /// Random walk on `mu`.
    #[serde(default = "default_mean_walk_weight")]
    pub mean_walk: f64,
    /// Scale move on the root height.
    #[serde(default = "default_height_scale_weight")]
    pub height_scale: f64,
    /// Gibbs draw of the root height.
    #[serde(default = "default_height_gibbs_weight")]
    pub height_gibbs: f64,
}

fn default_observations() -> Vec<f64> {
    vec![0.8, 1.3, 0.4, 1.9, 1.1, 0.7]
}

fn default_prior_sd() -> f64 {
    10.0
}

fn default_noise_sd() -> f64 {
    1.0
}

fn default_taxa() -> Vec<String> {
    ["human", "chimp", "gorilla", "orangutan"]
        .iter()
        .map(|taxon| taxon.to_string())
        .collect()
}

fn default_node_spacing() -> f64 {
    0.1
}

fn default_height_rate() -> f64 {
    1.0
}

fn default_mean_window() -> f64 {
    0.75
}

fn default_height_scale() -> f64 {
    0.5
}

fn default_mean_walk_weight() -> f64 {
    2.0
}

fn default_height_scale_weight() -> f64 {
    1.0
}

fn default_height_gibbs_weight() -> f64 {
    0.5
}

impl Default for OperatorWeights {
    fn default() -> Self {
        Self {
            mean_walk: default_mean_walk_weight(),
            height_scale: default_height_scale_weight(),
            height_gibbs: default_height_gibbs_weight(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            observations: default_observations(),
            prior_mean: 0.0,
            prior_sd: default_prior_sd(),
            noise_sd: default_noise_sd(),
            taxa: default_taxa(),
            node_spacing: default_node_spacing(),
            height_rate: default_height_rate(),
            mean_window: default_mean_window(),
            height_scale: default_height_scale(),
            weights: OperatorWeights::default(),
        }
    }
}

impl ModelConfig {
    /// Loads and validates a YAML model description.
    pub fn load(path: &Path) -> Result<Self, BmcError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            BmcError::Config(
                ErrorInfo::new("model-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let config: ModelConfig = serde_yaml::from_str(&contents).map_err(|err| {
            BmcError::Config(
                ErrorInfo::new("model-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges.
    pub fn validate(&self) -> Result<(), BmcError> {
        let positive = [
            ("prior_sd", self.prior_sd),
            ("noise_sd", self.noise_sd),
            ("node_spacing", self.node_spacing),
            ("height_rate", self.height_rate),
            ("mean_window", self.mean_window),
            ("height_scale", self.height_scale),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(BmcError::Config(
                    ErrorInfo::new("model-range", "model setting must be positive and finite")
                        .with_context("field", field)
                        .with_context("value", value.to_string()),
                ));
            }
        }
        if self.observations.is_empty() || self.observations.iter().any(|y| !y.is_finite()) {
            return Err(BmcError::Config(ErrorInfo::new(
                "model-observations",
                "at least one finite observation is required",
            )));
        }
        if self.taxa.len() < 2 {
            return Err(BmcError::Config(
                ErrorInfo::new("model-taxa", "the tree needs at least two taxa")
                    .with_context("taxa", self.taxa.len().to_string()),
            ));
        }
        let weights = [
            self.weights.mean_walk,
            self.weights.height_scale,
            self.weights.height_gibbs,
        ];
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) || weights.iter().all(|w| *w == 0.0) {
            return Err(BmcError::Config(
                ErrorInfo::new("model-weights", "operator weights must be non-negative")
                    .with_hint("keep at least one operator with a positive weight"),
            ));
        }
        Ok(())
    }

    /// Density of this model.
    pub fn density(&self) -> NormalModel {
        NormalModel {
            observations: self.observations.clone(),
            prior_mean: self.prior_mean,
            prior_sd: self.prior_sd,
            noise_sd: self.noise_sd,
            height_rate: self.height_rate,
        }
    }

    /// Caterpillar tree over `taxa` with evenly spaced internal nodes.
    pub fn tree(&self) -> Result<TreeGraph, BmcError> {
        let n = self.taxa.len();
        let mut nodes: Vec<TreeNode> = self
            .taxa
            .iter()
            .map(|taxon| TreeNode::leaf(0.0, taxon.clone()))
            .collect();
        let mut parents: Vec<Option<usize>> = (0..n).map(|leaf| Some(n + leaf.max(1) - 1)).collect();
        for k in 0..n - 1 {
            nodes.push(TreeNode::internal((k + 1) as f64 * self.node_spacing));
            parents.push((k + 2 < n).then_some(n + k + 1));
        }
        TreeGraph::new(TREE, nodes, parents)
    }

    /// Fresh context seeded with `seed`.
    pub fn build_context(&self, seed: u64) -> Result<SimulationContext, BmcError> {
        self.validate()?;
        let mut state = SimulationState::new();
        state.add_parameter(Parameter::scalar(MEAN, self.prior_mean))?;
        state.add_tree(self.tree()?)?;

        let mut schedule = OperatorSchedule::new();
        if self.weights.mean_walk > 0.0 {
            schedule.add(
                Box::new(MeanWalk::new(MEAN, self.mean_window)),
                self.weights.mean_walk,
            )?;
        }
        if self.weights.height_scale > 0.0 {
            schedule.add(
                Box::new(RootHeightScale::new(TREE, self.height_scale)),
                self.weights.height_scale,
            )?;
        }
        if self.weights.height_gibbs > 0.0 {
            schedule.add(
                Box::new(RootHeightGibbs::new(TREE, self.height_rate)),
                self.weights.height_gibbs,
            )?;
        }

        Ok(SimulationContext::new(
            state,
            Box::new(PowerPosterior::new(self.density())),
            schedule,
            RngHandle::from_seed(seed),
        ))
    }
}

/// Conjugate normal-mean density with an exponential root-height prior.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalModel {
    observations: Vec<f64>,
    prior_mean: f64,
    prior_sd: f64,
    noise_sd: f64,
    height_rate: f64,
}

impl NormalModel {
    /// Exact log marginal likelihood of the observations.
    ///
    /// The tree does not enter the likelihood, so its prior cancels.
    pub fn log_evidence(&self) -> f64 {
        let n = self.observations.len() as f64;
        let mean = self.observations.iter().sum::<f64>() / n;
        let scatter: f64 = self.observations.iter().map(|y| (y - mean).powi(2)).sum();
        let noise = self.noise_sd * self.noise_sd;
        let spread = noise + n * self.prior_sd * self.prior_sd;
        -0.5 * n * (2.0 * PI * noise).ln() - scatter / (2.0 * noise) + 0.5 * (noise / spread).ln()
            - n * (mean - self.prior_mean).powi(2) / (2.0 * spread)
    }

    /// Posterior mean and standard deviation of `mu` at `theta = 1`.
    pub fn posterior_mean(&self) -> (f64, f64) {
        let n = self.observations.len() as f64;
        let precision = 1.0 / self.prior_sd.powi(2) + n / self.noise_sd.powi(2);
        let weighted = self.prior_mean / self.prior_sd.powi(2)
            + self.observations.iter().sum::<f64>() / self.noise_sd.powi(2);
        (weighted / precision, precision.recip().sqrt())
    }
}

impl Density for NormalModel {
    fn log_prior(&self, state: &SimulationState) -> Result<f64, BmcError> {
        let mu = state.parameter(MEAN)?.value(0)?;
        let tree = state.tree(TREE)?;
        let root = tree.height(tree.root())?;
        let z = (mu - self.prior_mean) / self.prior_sd;
        Ok(-0.5 * (2.0 * PI * self.prior_sd * self.prior_sd).ln() - 0.5 * z * z
            + self.height_rate.ln()
            - self.height_rate * root)
    }

    fn log_likelihood(&self, state: &SimulationState) -> Result<f64, BmcError> {
        let mu = state.parameter(MEAN)?.value(0)?;
        let noise = self.noise_sd * self.noise_sd;
        let norm = -0.5 * (2.0 * PI * noise).ln();
        Ok(self
            .observations
            .iter()
            .map(|y| norm - (y - mu).powi(2) / (2.0 * noise))
            .sum())
    }
}

/// Symmetric uniform random walk on a scalar parameter.
///
/// The tunable is the log of the half-width.
#[derive(Debug, Clone)]
pub struct MeanWalk {
    name: String,
    parameter: String,
    log_window: f64,
}

impl MeanWalk {
    /// Walk on `parameter` with half-width `window`.
    pub fn new(parameter: &str, window: f64) -> Self {
        Self {
            name: format!("{parameter}-walk"),
            parameter: parameter.to_string(),
            log_window: window.ln(),
        }
    }
}

impl Operator for MeanWalk {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut SimulationState, rng: &mut RngHandle) -> Result<f64, BmcError> {
        let window = self.log_window.exp();
        let parameter = state.parameter_mut(&self.parameter)?;
        let value = parameter.value(0)?;
        parameter.set_value(0, value + (2.0 * rng.uniform() - 1.0) * window)?;
        Ok(0.0)
    }

    fn tunable(&self) -> Option<f64> {
        Some(self.log_window)
    }

    fn set_tunable(&mut self, value: f64) {
        self.log_window = value;
    }
}

/// Multiplies the root height by `exp(lambda * (2u - 1))`.
///
/// Moves that would drop the root below a child are refused.
#[derive(Debug, Clone)]
pub struct RootHeightScale {
    tree: String,
    log_lambda: f64,
}

impl RootHeightScale {
    /// Scale move on the root of `tree` with range `lambda`.
    pub fn new(tree: &str, lambda: f64) -> Self {
        Self {
            tree: tree.to_string(),
            log_lambda: lambda.ln(),
        }
    }
}

impl Operator for RootHeightScale {
    fn name(&self) -> &str {
        "root-height-scale"
    }

    fn propose(&mut self, state: &mut SimulationState, rng: &mut RngHandle) -> Result<f64, BmcError> {
        let log_scale = self.log_lambda.exp() * (2.0 * rng.uniform() - 1.0);
        let tree = state.tree_mut(&self.tree)?;
        let root = tree.root();
        let proposed = tree.height(root)? * log_scale.exp();
        if proposed < oldest_child(tree, root)? {
            return Err(BmcError::operator_failed(
                self.name(),
                "root would fall below a child",
            ));
        }
        tree.set_height(root, proposed)?;
        Ok(log_scale)
    }

    fn tunable(&self) -> Option<f64> {
        Some(self.log_lambda)
    }

    fn set_tunable(&mut self, value: f64) {
        self.log_lambda = value;
    }
}

/// Draws the root height from its full conditional, a shifted exponential.
#[derive(Debug, Clone)]
pub struct RootHeightGibbs {
    tree: String,
    rate: f64,
}

impl RootHeightGibbs {
    /// Gibbs move for the root of `tree` under an exponential prior of `rate`.
    pub fn new(tree: &str, rate: f64) -> Self {
        Self {
            tree: tree.to_string(),
            rate,
        }
    }
}

impl Operator for RootHeightGibbs {
    fn name(&self) -> &str {
        "root-height-gibbs"
    }

    fn propose(&mut self, state: &mut SimulationState, rng: &mut RngHandle) -> Result<f64, BmcError> {
        let tree = state.tree_mut(&self.tree)?;
        let root = tree.root();
        let floor = oldest_child(tree, root)?;
        tree.set_height(root, floor - rng.uniform().ln() / self.rate)?;
        Ok(0.0)
    }

    fn is_gibbs(&self) -> bool {
        true
    }
}

fn oldest_child(tree: &TreeGraph, node: usize) -> Result<f64, BmcError> {
    tree.children(node)
        .into_iter()
        .try_fold(0.0_f64, |acc, child| Ok(acc.max(tree.height(child)?)))
}
