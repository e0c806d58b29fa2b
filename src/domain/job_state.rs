// ============================================================
// Layer 3 — Training Job State
// ============================================================
// Progress owned by the driver. Only the driver mutates it;
// it is written next to each checkpoint as job_state.json so a
// restarted job resumes from the last persisted step.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingJobState {
    /// Number of optimisation steps applied so far
    pub global_step:         u64,
    pub checkpoint_dir:      PathBuf,
    pub export_dir:          PathBuf,
    /// Step at which the most recent evaluation ran
    pub last_evaluated_step: Option<u64>,
}

impl TrainingJobState {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_step:         0,
            checkpoint_dir:      checkpoint_dir.into(),
            export_dir:          export_dir.into(),
            last_evaluated_step: None,
        }
    }

    pub fn is_terminal(&self, train_steps: u64) -> bool {
        self.global_step >= train_steps
    }

    /// True when the weights at the current step were never evaluated.
    pub fn needs_evaluation(&self) -> bool {
        self.last_evaluated_step != Some(self.global_step)
    }
}
