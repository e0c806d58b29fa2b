// ============================================================
// Layer 3 — Error Kinds
// ============================================================
// Every failure the model layer can detect on its own. Errors
// raised by the tensor engine or the file system travel as
// anyhow errors instead and are never mapped onto these.
//
// None of these are retried: they propagate up through the
// driver and terminate the job.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    /// Unknown architecture, missing or out-of-range hyperparameter,
    /// malformed job configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tensor reached a component with dimensions it cannot accept.
    #[error("shape mismatch: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        expected: String,
        actual:   Vec<usize>,
    },

    /// The caller broke the mode contract (labels missing in TRAIN/EVAL,
    /// optimisation step requested outside TRAIN, ...).
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl ClassifierError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn shape_mismatch(expected: impl Into<String>, actual: &[usize]) -> Self {
        Self::ShapeMismatch { expected: expected.into(), actual: actual.to_vec() }
    }

    pub fn contract_violation(msg: impl Into<String>) -> Self {
        Self::ContractViolation(msg.into())
    }
}
