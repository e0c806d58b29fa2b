// ============================================================
// Layer 6 — Eval Summary Writer
// ============================================================
// Appends one CSV row per evaluation to <output_dir>/eval/metrics.csv:
//
//   step,loss,accuracy
//   100,0.412300,0.884000
//   200,0.301100,0.912000
//
// The writer is opened once per run and owned by the driver.
// Rows are buffered and flushed after every evaluation; Drop
// flushes whatever is left, so an aborted job still leaves a
// complete file behind.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

const HEADER: &str = "step,loss,accuracy";

/// Result of one full pass over the eval split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub global_step: u64,
    /// Mean of the per-batch losses; NaN when the split is empty
    pub loss:        f64,
    pub accuracy:    f64,
    pub examples:    usize,
}

pub struct SummaryWriter {
    csv_path: PathBuf,
    out:      BufWriter<File>,
}

impl SummaryWriter {
    /// Open (or continue) the CSV in `dir`. The header is only
    /// written when the file is new, so resumed runs append.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create eval dir '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        let is_new   = !csv_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open '{}'", csv_path.display()))?;

        let mut out = BufWriter::new(file);
        if is_new {
            writeln!(out, "{HEADER}")?;
            tracing::debug!("Created eval summary '{}'", csv_path.display());
        }
        Ok(Self { csv_path, out })
    }

    pub fn log(&mut self, result: &EvalResult) -> Result<()> {
        writeln!(
            self.out,
            "{},{:.6},{:.6}",
            result.global_step, result.loss, result.accuracy,
        )?;
        self.out.flush()?;
        tracing::debug!("Logged eval summary for step {}", result.global_step);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!("Failed to flush '{}': {}", self.csv_path.display(), e);
        }
    }
}
