// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<LabeledImage>
// into the tensors the model function consumes:
//
//   images: [batch, HEIGHT, WIDTH, 1]   (channel axis last)
//   labels: [batch, NCLASSES]           (one-hot, f32)
//
// Both tensors share the batch index: row i of `labels`
// describes image i.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::image::LabeledImage;
use crate::domain::{HEIGHT, NCLASSES, WIDTH};

// ─── ImageBatch ───────────────────────────────────────────────────────────────
/// A batch of images plus their one-hot labels.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Shape: [batch_size, HEIGHT, WIDTH, 1]
    pub images: Tensor<B, 4>,

    /// Shape: [batch_size, NCLASSES]
    pub labels: Tensor<B, 2>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    /// The device to create tensors on
    pub device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

/// One-hot encode class ids into a flat row-major buffer.
pub fn one_hot(labels: &[u8], num_classes: usize) -> Vec<f32> {
    let mut flat = vec![0.0f32; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        flat[row * num_classes + usize::from(label)] = 1.0;
    }
    flat
}

impl<B: Backend> Batcher<LabeledImage, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<LabeledImage>) -> ImageBatch<B> {
        let batch_size = items.len();

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().copied())
            .collect();

        let labels: Vec<u8> = items.iter().map(|item| item.label).collect();

        // Flat buffers become shaped tensors in one step
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, HEIGHT, WIDTH, 1]),
            &self.device,
        );
        let labels = Tensor::<B, 2>::from_data(
            TensorData::new(one_hot(&labels, NCLASSES), [batch_size, NCLASSES]),
            &self.device,
        );

        ImageBatch { images, labels }
    }
}
