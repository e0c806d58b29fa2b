// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training job:
//
//   Step 1: Validate the job configuration     (Layer 3 - domain)
//   Step 2: Load the train and eval splits     (Layer 4 - data)
//   Step 3: Build Burn datasets                (Layer 4 - data)
//   Step 4: Run train-and-evaluate             (Layer 5 - ml)
//
// Everything the job writes lives under output_dir:
//
//   output_dir/
//     checkpoints/        ← model/optim records, job_state.json
//     export/exporter/    ← latest servable export
//     eval/metrics.csv    ← one row per evaluation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::data::{dataset::ImageDataset, loader::IdxLoader};
use crate::domain::error::ClassifierError;
use crate::domain::hparams::Hyperparameters;
use crate::domain::image::LabeledImage;
use crate::domain::traits::ImageSource;
use crate::ml::trainer::{run_training, JobReport};

// ─── Job Configuration ───────────────────────────────────────────────────────
// Where the data is, where outputs go, how often to checkpoint and
// evaluate, plus the model hyperparameters (flattened, so a single
// JSON mapping carries everything).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// IDX images file, or a directory holding one images/labels pair
    pub train_data_paths:       PathBuf,
    pub eval_data_paths:        PathBuf,
    pub output_dir:             PathBuf,
    #[serde(default = "default_batch_size")]
    pub train_batch_size:       usize,
    #[serde(default = "default_batch_size")]
    pub eval_batch_size:        usize,
    /// Minimum seconds between two evaluations during training
    #[serde(default = "default_eval_interval_secs")]
    pub eval_interval_secs:     u64,
    #[serde(default = "default_checkpoint_every_steps")]
    pub checkpoint_every_steps: u64,
    /// How many exports survive garbage collection (1 = latest only)
    #[serde(default = "default_exports_to_keep")]
    pub exports_to_keep:        usize,
    /// Shuffle / initialisation seed; random when absent
    #[serde(default)]
    pub seed:                   Option<u64>,
    #[serde(flatten)]
    pub hparams:                Hyperparameters,
}

fn default_batch_size() -> usize { 100 }
fn default_eval_interval_secs() -> u64 { 60 }
fn default_checkpoint_every_steps() -> u64 { 100 }
fn default_exports_to_keep() -> usize { 1 }

impl JobConfig {
    pub fn new(
        train_data_paths: impl Into<PathBuf>,
        eval_data_paths:  impl Into<PathBuf>,
        output_dir:       impl Into<PathBuf>,
        hparams:          Hyperparameters,
    ) -> Self {
        Self {
            train_data_paths:       train_data_paths.into(),
            eval_data_paths:        eval_data_paths.into(),
            output_dir:             output_dir.into(),
            train_batch_size:       default_batch_size(),
            eval_batch_size:        default_batch_size(),
            eval_interval_secs:     default_eval_interval_secs(),
            checkpoint_every_steps: default_checkpoint_every_steps(),
            exports_to_keep:        default_exports_to_keep(),
            seed:                   None,
            hparams,
        }
    }

    /// Build a config from a string-keyed mapping such as a parsed
    /// JSON job file. Unknown architectures, missing keys and bad
    /// values are all configuration errors.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, ClassifierError> {
        let cfg: Self = serde_json::from_value(Value::Object(map))
            .map_err(|e| ClassifierError::configuration(format!("invalid job configuration: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        self.hparams.validate()?;
        if self.train_batch_size == 0 || self.eval_batch_size == 0 {
            return Err(ClassifierError::configuration("batch sizes must be > 0"));
        }
        if self.checkpoint_every_steps == 0 {
            return Err(ClassifierError::configuration("checkpoint_every_steps must be > 0"));
        }
        if self.exports_to_keep == 0 {
            return Err(ClassifierError::configuration("exports_to_keep must be > 0"));
        }
        Ok(())
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.output_dir.join("checkpoints")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.output_dir.join("export").join("exporter")
    }

    pub fn eval_dir(&self) -> PathBuf {
        self.output_dir.join("eval")
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: JobConfig,
}

impl TrainUseCase {
    pub fn new(config: JobConfig) -> Self {
        Self { config }
    }

    /// Execute the job end to end
    pub fn execute(&self) -> Result<JobReport> {
        let cfg = &self.config;
        cfg.validate()?;

        let train = load_split("train", &cfg.train_data_paths)?;
        let eval  = load_split("eval",  &cfg.eval_data_paths)?;

        run_training(cfg, ImageDataset::new(train), ImageDataset::new(eval))
    }
}

fn load_split(name: &str, path: &Path) -> Result<Vec<LabeledImage>> {
    tracing::info!("Loading {} split from '{}'", name, path.display());
    let source: Box<dyn ImageSource> = Box::new(IdxLoader::from_path(path)?);
    let examples = source
        .load_all()
        .with_context(|| format!("Cannot load {name} split from '{}'", path.display()))?;
    tracing::info!("Loaded {} {} examples", examples.len(), name);
    Ok(examples)
}
