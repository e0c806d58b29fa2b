// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Answers one serving request with an exported model:
//
//   1. Locate the export (a single export dir, or the exporter
//      root, in which case the newest export is used)
//   2. Rebuild the servable on the inference backend
//   3. Parse the request file: {"image": [batch][28][28]}
//   4. Return {probabilities, class_ids}

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::infra::exporter::{load_export, Exporter};
use crate::ml::model_fn::PredictionSet;
use crate::ml::serving::{Servable, ServingRequest};
use crate::ml::InnerBackend;

pub struct PredictUseCase {
    servable: Servable<InnerBackend>,
}

impl PredictUseCase {
    pub fn new(export_dir: impl Into<PathBuf>) -> Result<Self> {
        let export_dir = export_dir.into();
        let device     = Default::default();
        let servable   = if export_dir.join("export.json").exists() {
            load_export::<InnerBackend>(&export_dir, &device)?
        } else {
            Exporter::new(&export_dir, 1).load_latest::<InnerBackend>(&device)?
        };
        Ok(Self { servable })
    }

    pub fn servable(&self) -> &Servable<InnerBackend> {
        &self.servable
    }

    pub fn predict_file(&self, input: &Path) -> Result<PredictionSet> {
        let json = fs::read_to_string(input)
            .with_context(|| format!("Cannot read request '{}'", input.display()))?;
        let body: serde_json::Value = serde_json::from_str(&json)
            .with_context(|| format!("Request '{}' is not valid JSON", input.display()))?;
        let request = ServingRequest::from_json(&body)?;
        tracing::info!("Predicting {} images with the {} model", request.batch_size(), self.servable.hparams().model);
        Ok(self.servable.predict(&request)?)
    }
}
