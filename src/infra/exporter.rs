// ============================================================
// Layer 6 — Latest Exporter
// ============================================================
// Writes a servable snapshot after every evaluation:
//
//   export/exporter/
//     {global_step}/
//       model.mpk        ← PREDICT-mode weights (CompactRecorder)
//       export.json      ← step, hyperparameters, serving signature
//
// Exports are staged in "{step}.tmp" and renamed into place, so a
// reader never sees a half-written export. Once the new export is
// visible, all but the newest `keep` exports are removed
// (keep = 1 is the "latest" policy).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::domain::hparams::Hyperparameters;
use crate::ml::model::ImageClassifier;
use crate::ml::serving::{Servable, ServingSignature};

const METADATA_FILE: &str = "export.json";
const MODEL_FILE:    &str = "model";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub global_step: u64,
    pub hparams:     Hyperparameters,
    pub signature:   ServingSignature,
}

pub struct Exporter {
    root: PathBuf,
    keep: usize,
}

impl Exporter {
    pub fn new(root: impl Into<PathBuf>, keep: usize) -> Self {
        Self { root: root.into(), keep: keep.max(1) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Export `model` as the servable for `global_step`; returns its directory.
    pub fn export<B: Backend>(
        &self,
        model:       &ImageClassifier<B>,
        hparams:     &Hyperparameters,
        global_step: u64,
    ) -> Result<PathBuf> {
        let final_dir = self.root.join(global_step.to_string());
        let staging   = self.root.join(format!("{global_step}.tmp"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("Cannot create export dir '{}'", staging.display()))?;

        CompactRecorder::new()
            .record(model.clone().into_record(), staging.join(MODEL_FILE))
            .with_context(|| format!("Failed to export model to '{}'", staging.display()))?;

        let metadata = ExportMetadata {
            global_step,
            hparams:   hparams.clone(),
            signature: ServingSignature::predictions(),
        };
        fs::write(staging.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)?;

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&staging, &final_dir)
            .with_context(|| format!("Cannot publish export '{}'", final_dir.display()))?;

        self.garbage_collect()?;
        tracing::info!("Exported servable for step {} to '{}'", global_step, final_dir.display());
        Ok(final_dir)
    }

    /// Published exports, oldest first.
    pub fn exports(&self) -> Result<Vec<(u64, PathBuf)>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut exports: Vec<(u64, PathBuf)> = fs::read_dir(&self.root)
            .with_context(|| format!("Cannot read export dir '{}'", self.root.display()))?
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let step = path.file_name()?.to_str()?.parse::<u64>().ok()?;
                path.is_dir().then_some((step, path))
            })
            .collect();
        exports.sort_by_key(|(step, _)| *step);
        Ok(exports)
    }

    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.exports()?.pop().map(|(_, path)| path))
    }

    /// Rebuild the newest export as a servable on `device`.
    pub fn load_latest<B: Backend>(&self, device: &B::Device) -> Result<Servable<B>> {
        let Some(dir) = self.latest()? else {
            bail!("No export found under '{}'. Have you run 'train' first?", self.root.display());
        };
        load_export(&dir, device)
    }

    fn garbage_collect(&self) -> Result<()> {
        let exports = self.exports()?;
        let stale   = exports.len().saturating_sub(self.keep);
        for (step, path) in exports.into_iter().take(stale) {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Cannot remove old export '{}'", path.display()))?;
            tracing::debug!("Removed superseded export for step {}", step);
        }
        Ok(())
    }
}

/// Load one export directory as a servable.
pub fn load_export<B: Backend>(dir: &Path, device: &B::Device) -> Result<Servable<B>> {
    let json = fs::read_to_string(dir.join(METADATA_FILE))
        .with_context(|| format!("Cannot read export metadata in '{}'", dir.display()))?;
    let metadata: ExportMetadata = serde_json::from_str(&json)?;

    let model = metadata.hparams.model.init::<B>(&metadata.hparams, device)?;
    let record = CompactRecorder::new()
        .load(dir.join(MODEL_FILE), device)
        .with_context(|| format!("Cannot load exported model in '{}'", dir.display()))?;

    tracing::info!("Loaded {} servable from step {}", metadata.hparams.model, metadata.global_step);
    Ok(Servable::new(model.load_record(record), metadata.hparams, device.clone()))
}
