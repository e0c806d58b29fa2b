// ============================================================
// Layer 3 — Hyperparameters and Variant Selector
// ============================================================
// Hyperparameters are resolved once from the job configuration
// and stay read-only for the lifetime of the job. The `model`
// key picks one entry of the architecture catalog; any name
// outside the catalog is rejected while the configuration is
// parsed, so no model is ever built for it.
//
// Defaults for the convolutional knobs follow the classic MNIST
// lab: 5x5 kernels, 10 then 20 filters, dropout 0.25.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::domain::error::ClassifierError;

// ─── Architecture catalog names ──────────────────────────────────────────────
/// The fixed set of model-building strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArchitectureKind {
    Linear,
    Dnn,
    DnnDropout,
    Cnn,
}

impl ArchitectureKind {
    /// Every catalog entry, in declaration order.
    pub const ALL: [ArchitectureKind; 4] = [
        ArchitectureKind::Linear,
        ArchitectureKind::Dnn,
        ArchitectureKind::DnnDropout,
        ArchitectureKind::Cnn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArchitectureKind::Linear     => "linear",
            ArchitectureKind::Dnn        => "dnn",
            ArchitectureKind::DnnDropout => "dnn_dropout",
            ArchitectureKind::Cnn        => "cnn",
        }
    }
}

impl fmt::Display for ArchitectureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchitectureKind {
    type Err = ClassifierError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        select_architecture(name)
    }
}

impl TryFrom<String> for ArchitectureKind {
    type Error = ClassifierError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        select_architecture(&name)
    }
}

impl From<ArchitectureKind> for String {
    fn from(kind: ArchitectureKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Variant selector: resolve a requested architecture name.
/// Fails closed: there is no fallback architecture.
pub fn select_architecture(name: &str) -> Result<ArchitectureKind, ClassifierError> {
    ArchitectureKind::ALL
        .into_iter()
        .find(|kind| kind.as_str() == name)
        .ok_or_else(|| {
            ClassifierError::configuration(format!(
                "unknown model '{name}', expected one of linear|dnn|dnn_dropout|cnn"
            ))
        })
}

// ─── Hyperparameters ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub model:         ArchitectureKind,
    pub learning_rate: f64,
    pub train_steps:   u64,
    #[serde(default = "default_ksize")]
    pub ksize1:        usize,
    #[serde(default = "default_ksize")]
    pub ksize2:        usize,
    #[serde(default = "default_nfil1")]
    pub nfil1:         usize,
    #[serde(default = "default_nfil2")]
    pub nfil2:         usize,
    #[serde(default = "default_dprob")]
    pub dprob:         f64,
    /// Widths of the three hidden layers used by `dnn` and `dnn_dropout`
    #[serde(default = "default_hidden_units")]
    pub hidden_units:  Vec<usize>,
}

fn default_ksize() -> usize { 5 }
fn default_nfil1() -> usize { 10 }
fn default_nfil2() -> usize { 20 }
fn default_dprob() -> f64 { 0.25 }
fn default_hidden_units() -> Vec<usize> { vec![300, 100, 30] }

impl Hyperparameters {
    /// Hyperparameters with every architecture knob at its default.
    pub fn new(model: ArchitectureKind, learning_rate: f64, train_steps: u64) -> Self {
        Self {
            model,
            learning_rate,
            train_steps,
            ksize1:       default_ksize(),
            ksize2:       default_ksize(),
            nfil1:        default_nfil1(),
            nfil2:        default_nfil2(),
            dprob:        default_dprob(),
            hidden_units: default_hidden_units(),
        }
    }

    /// Check every value the architectures and optimiser depend on.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ClassifierError::configuration(format!(
                "learning_rate must be a positive number, got {}", self.learning_rate
            )));
        }
        if self.train_steps == 0 {
            return Err(ClassifierError::configuration("train_steps must be positive"));
        }
        if !(0.0..1.0).contains(&self.dprob) {
            return Err(ClassifierError::configuration(format!(
                "dprob must lie in [0, 1), got {}", self.dprob
            )));
        }
        match self.model {
            ArchitectureKind::Linear => {}
            ArchitectureKind::Dnn | ArchitectureKind::DnnDropout => {
                if self.hidden_units.len() != 3 || self.hidden_units.contains(&0) {
                    return Err(ClassifierError::configuration(format!(
                        "{} needs exactly three non-zero hidden_units, got {:?}",
                        self.model, self.hidden_units
                    )));
                }
            }
            ArchitectureKind::Cnn => {
                // Same padding only keeps the spatial size for odd kernels.
                for (name, k) in [("ksize1", self.ksize1), ("ksize2", self.ksize2)] {
                    if k == 0 || k % 2 == 0 {
                        return Err(ClassifierError::configuration(format!(
                            "{name} must be a positive odd kernel size, got {k}"
                        )));
                    }
                }
                if self.nfil1 == 0 || self.nfil2 == 0 {
                    return Err(ClassifierError::configuration("nfil1 and nfil2 must be positive"));
                }
            }
        }
        Ok(())
    }

    /// A job may only resume from checkpoints written with the same
    /// architecture. `train_steps` and `learning_rate` are free to change.
    pub fn check_resumable_from(&self, stored: &Hyperparameters) -> Result<(), ClassifierError> {
        let mismatches: Vec<String> = [
            ("model",        stored.model.to_string(),           self.model.to_string()),
            ("ksize1",       stored.ksize1.to_string(),          self.ksize1.to_string()),
            ("ksize2",       stored.ksize2.to_string(),          self.ksize2.to_string()),
            ("nfil1",        stored.nfil1.to_string(),           self.nfil1.to_string()),
            ("nfil2",        stored.nfil2.to_string(),           self.nfil2.to_string()),
            ("dprob",        stored.dprob.to_string(),           self.dprob.to_string()),
            ("hidden_units", format!("{:?}", stored.hidden_units), format!("{:?}", self.hidden_units)),
        ]
        .into_iter()
        .filter(|(_, was, now)| was != now)
        .map(|(name, was, now)| format!("{name} {was} → {now}"))
        .collect();

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(ClassifierError::configuration(format!(
                "checkpoints were written with other architecture settings ({})",
                mismatches.join(", ")
            )))
        }
    }
}
