//! Error values shared by the sampling crates.
//!
//! Every failure carries an [`ErrorInfo`]: a kebab-case code that callers
//! match on, a sentence for humans, and whatever keyed context the raising
//! site had at hand.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload shared by every [`BmcError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Kebab-case identifier, e.g. `operator-mismatch`.
    pub code: String,
    /// One sentence for the user.
    pub message: String,
    /// Ordered so rendered diagnostics are stable between runs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Suggested fix, when the raising site knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Bare payload with no context and no hint.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorInfo {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records `key = value`; a repeated key keeps the latest value.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attaches a suggested fix.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    /// Renders as `[code] message {k=v; k=v} (try: hint)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        let mut pairs = self.context.iter();
        if let Some((key, value)) = pairs.next() {
            write!(f, " {{{key}={value}")?;
            for (key, value) in pairs {
                write!(f, "; {key}={value}")?;
            }
            f.write_str("}")?;
        }
        match &self.hint {
            Some(hint) => write!(f, " (try: {hint})"),
            None => Ok(()),
        }
    }
}

/// Every fallible call in the engine returns this.
///
/// The variant names the subsystem that raised the error. The code inside
/// the payload says what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "info")]
pub enum BmcError {
    /// Parameters, trees and scores of the model graph.
    #[error("model: {0}")]
    Model(ErrorInfo),
    /// Raised by a proposal; `operator-failed` is an ordinary rejection.
    #[error("operator: {0}")]
    Operator(ErrorInfo),
    /// Incremental and full posterior evaluation disagree.
    #[error("drift: {0}")]
    Drift(ErrorInfo),
    /// Unreadable snapshot or one that does not fit the live model.
    #[error("checkpoint: {0}")]
    Checkpoint(ErrorInfo),
    /// Operator weights and tempering paths.
    #[error("schedule: {0}")]
    Schedule(ErrorInfo),
    /// Run settings out of range.
    #[error("config: {0}")]
    Config(ErrorInfo),
    /// Generator state that cannot be restored.
    #[error("seeding: {0}")]
    Rng(ErrorInfo),
    /// File and encoding failures.
    #[error("io: {0}")]
    Serde(ErrorInfo),
}

impl BmcError {
    /// Payload of whichever variant this is.
    pub fn info(&self) -> &ErrorInfo {
        use BmcError::*;
        match self {
            Model(info) | Operator(info) | Drift(info) | Checkpoint(info) | Schedule(info)
            | Config(info) | Rng(info) | Serde(info) => info,
        }
    }

    /// Same as `self.info().code`.
    pub fn code(&self) -> &str {
        self.info().code.as_str()
    }

    /// A proposal that could not be made. The chain counts it as a rejection.
    pub fn operator_failed(operator: &str, message: impl Into<String>) -> Self {
        let info = ErrorInfo::new("operator-failed", message).with_context("operator", operator);
        BmcError::Operator(info)
    }

    /// True only for the refusal built by [`BmcError::operator_failed`].
    pub fn is_operator_failure(&self) -> bool {
        match self {
            BmcError::Operator(info) => info.code == "operator-failed",
            _ => false,
        }
    }
}
