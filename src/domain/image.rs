// ============================================================
// Layer 3 — Labelled Image
// ============================================================
// One greyscale image with its class. Pixels are stored row-major
// and already scaled to [0, 1]; the channel axis is added later
// by the batcher (training) or the serving adapter (inference).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledImage {
    /// HEIGHT * WIDTH intensities, row-major
    pub pixels: Vec<f32>,

    /// Class id in [0, NCLASSES)
    pub label: u8,
}

impl LabeledImage {
    pub fn new(pixels: Vec<f32>, label: u8) -> Self {
        Self { pixels, label }
    }
}
