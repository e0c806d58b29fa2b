use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution intent for one invocation of the model function.
/// Exactly one mode is active per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Eval,
    Predict,
}

impl Mode {
    /// TRAIN and EVAL need a label batch, PREDICT never does.
    pub fn requires_labels(self) -> bool {
        matches!(self, Mode::Train | Mode::Eval)
    }

    /// Dropout layers only fire while training.
    pub fn is_training(self) -> bool {
        self == Mode::Train
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Train   => "train",
            Mode::Eval    => "eval",
            Mode::Predict => "predict",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_predict_runs_without_labels() {
        assert!(Mode::Train.requires_labels());
        assert!(Mode::Eval.requires_labels());
        assert!(!Mode::Predict.requires_labels());
    }

    #[test]
    fn test_display_matches_serde_name() {
        let json = serde_json::to_string(&Mode::Eval).unwrap();
        assert_eq!(json, format!("\"{}\"", Mode::Eval));
    }
}
