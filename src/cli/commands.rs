// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `predict`, and all
// their flags.
//
// `train` flags are all optional at the clap level: they are laid
// over an optional JSON job file and the merged mapping goes through
// JobConfig::from_map, so defaults and validation live in one place.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{fs, path::{Path, PathBuf}};

use crate::application::train_use_case::JobConfig;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train, evaluate and export an MNIST classifier
    Train(TrainArgs),

    /// Classify images with the latest export
    Predict(PredictArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug, Default, Serialize)]
pub struct TrainArgs {
    /// JSON job file; flags given on the command line override its keys
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// IDX images file (or directory with one images/labels pair) to train on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_data_paths: Option<PathBuf>,

    /// IDX images file (or directory) to evaluate on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_data_paths: Option<PathBuf>,

    /// Where checkpoints, exports and eval summaries are written
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Architecture: linear, dnn, dnn_dropout or cnn
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,

    /// Total number of optimisation steps
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_steps: Option<u64>,

    /// [default: 100]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_batch_size: Option<usize>,

    /// [default: 100]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_batch_size: Option<usize>,

    /// Minimum seconds between evaluations [default: 60]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_interval_secs: Option<u64>,

    /// [default: 100]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_every_steps: Option<u64>,

    /// Exports kept after garbage collection [default: 1]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports_to_keep: Option<usize>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// CNN: first kernel size [default: 5]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ksize1: Option<usize>,

    /// CNN: second kernel size [default: 5]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ksize2: Option<usize>,

    /// CNN: filters in the first conv layer [default: 10]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfil1: Option<usize>,

    /// CNN: filters in the second conv layer [default: 20]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfil2: Option<usize>,

    /// Dropout probability for dnn_dropout and cnn [default: 0.25]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dprob: Option<f64>,

    /// DNN hidden widths, comma separated [default: 300,100,30]
    #[arg(long, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_units: Option<Vec<usize>>,
}

impl TrainArgs {
    /// Merge the job file (if any) with the flags and validate.
    pub fn into_job_config(self) -> Result<JobConfig> {
        let mut map = match &self.config {
            Some(path) => read_job_file(path)?,
            None => Map::new(),
        };
        if let Value::Object(flags) = serde_json::to_value(&self)? {
            map.extend(flags);
        }
        Ok(JobConfig::from_map(map)?)
    }
}

fn read_job_file(path: &Path) -> Result<Map<String, Value>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read job file '{}'", path.display()))?;
    match serde_json::from_str::<Value>(&json)
        .with_context(|| format!("Job file '{}' is not valid JSON", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Job file '{}' must hold a JSON object", path.display()),
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// An export directory, or the exporter root to use its newest export
    #[arg(long, default_value = "output/export/exporter")]
    pub export_dir: PathBuf,

    /// JSON request file: {"image": [[[...28 floats]...28 rows]...]}
    #[arg(long)]
    pub input: PathBuf,
}
