// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe a training job:
//
//   hparams.rs   — Hyperparameters, the architecture catalog names
//                  and the variant selector that resolves them
//   mode.rs      — TRAIN / EVAL / PREDICT execution modes
//   error.rs     — typed failures shared by every layer
//   job_state.rs — driver progress persisted next to checkpoints
//   image.rs     — one labelled 28x28 greyscale image
//   traits.rs    — the contract for anything that supplies images
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O beyond serde derives
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Hyperparameters and the variant selector
pub mod hparams;

/// Execution modes
pub mod mode;

/// Error kinds raised while building or running a model
pub mod error;

/// Driver-owned training progress
pub mod job_state;

/// A single labelled image
pub mod image;

/// Core abstractions (traits) that other layers implement
pub mod traits;

/// Height of every image the catalog accepts
pub const HEIGHT: usize = 28;

/// Width of every image the catalog accepts
pub const WIDTH: usize = 28;

/// Number of digit classes
pub const NCLASSES: usize = 10;
