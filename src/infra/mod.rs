// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything the driver persists to disk:
//
//   checkpoint.rs — model + optimiser records and job_state.json,
//                   so an interrupted job resumes where it stopped
//
//   exporter.rs   — servable snapshots under export/exporter/<step>/,
//                   keeping only the newest ones
//
//   metrics.rs    — per-evaluation CSV summaries
//
// Reference: Burn Book §5 (Records and Checkpointing)

/// Checkpoint saving and resuming
pub mod checkpoint;

/// Latest-only servable exports
pub mod exporter;

/// Eval summary CSV writer
pub mod metrics;
