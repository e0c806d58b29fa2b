// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything a restarted job needs:
//
//   checkpoints/
//     model-{step}.mpk    ← trainable parameters (full precision)
//     optim-{step}.mpk    ← Adam moment estimates
//     job_state.json      ← TrainingJobState, written LAST
//     hparams.json        ← hyperparameters of the job
//
// job_state.json is the pointer to the latest checkpoint: it is
// only rewritten once both records for its step are on disk,
// and older records are pruned afterwards.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{DefaultRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};

use crate::domain::hparams::Hyperparameters;
use crate::domain::job_state::TrainingJobState;
use crate::ml::model::ImageClassifier;

const STATE_FILE:   &str = "job_state.json";
const HPARAMS_FILE: &str = "hparams.json";

/// Manages saving and loading of training checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn model_path(&self, step: u64) -> PathBuf {
        self.dir.join(format!("model-{step}"))
    }

    fn optim_path(&self, step: u64) -> PathBuf {
        self.dir.join(format!("optim-{step}"))
    }

    /// Persist model, optimiser and job state for `state.global_step`.
    pub fn save<B, O>(
        &self,
        model: &ImageClassifier<B>,
        optim: &O,
        state: &TrainingJobState,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<ImageClassifier<B>, B>,
    {
        let step = state.global_step;

        let model_path = self.model_path(step);
        DefaultRecorder::new()
            .record(model.clone().into_record(), model_path.clone())
            .with_context(|| format!("Failed to save model to '{}'", model_path.display()))?;

        let optim_path = self.optim_path(step);
        DefaultRecorder::new()
            .record(optim.to_record(), optim_path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", optim_path.display()))?;

        self.save_state(state)?;
        self.prune(step)?;

        tracing::debug!("Saved checkpoint at step {}", step);
        Ok(())
    }

    pub fn save_state(&self, state: &TrainingJobState) -> Result<()> {
        let path = self.dir.join(STATE_FILE);
        fs::write(&path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Failed to write '{}'", path.display()))
    }

    /// None when no checkpoint was ever written here.
    pub fn load_state(&self) -> Result<Option<TrainingJobState>> {
        let path = self.dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        let state = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt job state in '{}'", path.display()))?;
        Ok(Some(state))
    }

    pub fn load_model<B: Backend>(
        &self,
        model:  ImageClassifier<B>,
        step:   u64,
        device: &B::Device,
    ) -> Result<ImageClassifier<B>> {
        let path   = self.model_path(step);
        let record = DefaultRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load model checkpoint '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    pub fn load_optimizer<B, O>(&self, optim: O, step: u64, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<ImageClassifier<B>, B>,
    {
        let path   = self.optim_path(step);
        let record = DefaultRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load optimizer checkpoint '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }

    pub fn save_hparams(&self, hparams: &Hyperparameters) -> Result<()> {
        let path = self.dir.join(HPARAMS_FILE);
        fs::write(&path, serde_json::to_string_pretty(hparams)?)
            .with_context(|| format!("Cannot write hyperparameters to '{}'", path.display()))
    }

    pub fn load_hparams(&self) -> Result<Hyperparameters> {
        let path = self.dir.join(HPARAMS_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read hyperparameters from '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Remove model/optim records of every step except `keep_step`.
    fn prune(&self, keep_step: u64) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(step) = path.file_name().and_then(|n| n.to_str()).and_then(record_step) else {
                continue;
            };
            if step != keep_step {
                fs::remove_file(&path)
                    .with_context(|| format!("Cannot remove stale checkpoint '{}'", path.display()))?;
            }
        }
        Ok(())
    }
}

/// "model-120.mpk" → Some(120)
fn record_step(file_name: &str) -> Option<u64> {
    let rest = file_name
        .strip_prefix("model-")
        .or_else(|| file_name.strip_prefix("optim-"))?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;

    use crate::domain::hparams::ArchitectureKind;

    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn test_record_step_parsing() {
        assert_eq!(record_step("model-120.mpk"), Some(120));
        assert_eq!(record_step("optim-7.mpk"), Some(7));
        assert_eq!(record_step("job_state.json"), None);
        assert_eq!(record_step("model-.mpk"), None);
    }

    #[test]
    fn test_missing_state_means_fresh_job() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("checkpoints")).unwrap();
        assert!(ckpt.load_state().unwrap().is_none());
    }

    #[test]
    fn test_save_then_resume_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 10);
        let model  = ArchitectureKind::Linear
            .init::<TestAutodiffBackend>(&hp, &device)
            .unwrap();
        let optim  = AdamConfig::new().init::<TestAutodiffBackend, ImageClassifier<_>>();

        let mut state = TrainingJobState::new(dir.path(), dir.path().join("export"));
        state.global_step = 4;
        ckpt.save(&model, &optim, &state).unwrap();
        state.global_step = 8;
        ckpt.save(&model, &optim, &state).unwrap();
        ckpt.save_hparams(&hp).unwrap();

        let loaded = ckpt.load_state().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(ckpt.load_hparams().unwrap(), hp);

        // Older records were pruned, the latest ones load back
        let fresh = ArchitectureKind::Linear
            .init::<TestAutodiffBackend>(&hp, &device)
            .unwrap();
        assert!(ckpt.load_model(fresh.clone(), 4, &device).is_err());
        let restored = ckpt.load_model(fresh, 8, &device).unwrap();
        assert_eq!(restored.kind(), ArchitectureKind::Linear);

        let optim = AdamConfig::new().init::<TestAutodiffBackend, ImageClassifier<_>>();
        assert!(ckpt.load_optimizer(optim, 8, &device).is_ok());
    }
}
