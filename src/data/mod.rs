// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between IDX files on disk and tensor batches:
//
//   IDX files (.gz or raw)
//       │
//       ▼
//   IdxLoader      → decodes images + labels
//       │
//       ▼
//   ImageDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher   → [B,28,28,1] images + one-hot labels
//       │
//       ▼
//   DataLoader     → shuffled (train) or ordered (eval) batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads MNIST IDX image/label files
pub mod loader;

/// Implements Burn's Dataset trait for labelled images
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
