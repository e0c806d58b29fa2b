use burn::data::dataset::Dataset;

use crate::domain::image::LabeledImage;

/// One split of labelled images, served to Burn's DataLoader by index.
pub struct ImageDataset {
    examples: Vec<LabeledImage>,
}

impl ImageDataset {
    pub fn new(examples: Vec<LabeledImage>) -> Self { Self { examples } }

    pub fn example_count(&self) -> usize { self.examples.len() }
}

impl Dataset<LabeledImage> for ImageDataset {
    fn get(&self, index: usize) -> Option<LabeledImage> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
