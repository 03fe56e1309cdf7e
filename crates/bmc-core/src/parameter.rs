//! Named real-valued parameter vectors.

use serde::{Deserialize, Serialize};

use crate::errors::{BmcError, ErrorInfo};

/// A named, fixed-dimension vector of real values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    values: Vec<f64>,
    /// Inclusive lower bound applied to every component.
    #[serde(default)]
    lower: Option<f64>,
    /// Inclusive upper bound applied to every component.
    #[serde(default)]
    upper: Option<f64>,
}

impl Parameter {
    /// Creates an unbounded parameter.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            lower: None,
            upper: None,
        }
    }

    /// Creates a scalar parameter.
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, vec![value])
    }

    /// Adds inclusive bounds checked by [`Parameter::in_bounds`].
    pub fn with_bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of components.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// All components in order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of one component.
    pub fn value(&self, index: usize) -> Result<f64, BmcError> {
        self.values
            .get(index)
            .copied()
            .ok_or_else(|| self.out_of_range(index))
    }

    /// Overwrites one component.
    pub fn set_value(&mut self, index: usize, value: f64) -> Result<(), BmcError> {
        if index >= self.values.len() {
            return Err(self.out_of_range(index));
        }
        self.values[index] = value;
        Ok(())
    }

    /// Whether every component lies inside the declared bounds.
    pub fn in_bounds(&self) -> bool {
        self.values.iter().all(|&value| {
            self.lower.map_or(true, |lo| value >= lo) && self.upper.map_or(true, |hi| value <= hi)
        })
    }

    fn out_of_range(&self, index: usize) -> BmcError {
        BmcError::Model(
            ErrorInfo::new("parameter-index", "component index out of range")
                .with_context("parameter", self.name.clone())
                .with_context("index", index.to_string())
                .with_context("dimension", self.values.len().to_string()),
        )
    }
}
