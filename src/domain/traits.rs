// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The driver never cares where images come from. Anything that
// can produce a split of labelled images implements ImageSource:
//   - IdxLoader      → MNIST IDX files (raw or gzip)

use anyhow::Result;
use crate::domain::image::LabeledImage;

/// Any component that can load one split of labelled images.
pub trait ImageSource {
    /// Load every example of this split, in file order.
    fn load_all(&self) -> Result<Vec<LabeledImage>>;
}
