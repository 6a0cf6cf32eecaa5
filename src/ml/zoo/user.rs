// Models for the user namespace. These are built from the whole
// experiment config rather than a keyword-argument map.

use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};

/// A 1x1 convolution scoring every location independently.
/// With `image_level` the scores are averaged per sample.
#[derive(Config, Debug)]
pub struct PixelClassifierConfig {
    pub in_channels: usize,
    pub classes:     usize,
    pub image_level: bool,
}

impl PixelClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PixelClassifier<B> {
        PixelClassifier {
            proj:        Conv2dConfig::new([self.in_channels, self.classes], [1, 1]).init(device),
            image_level: self.image_level,
        }
    }
}

#[derive(Module, Debug)]
pub struct PixelClassifier<B: Backend> {
    pub proj:        Conv2d<B>,
    pub image_level: bool,
}

impl<B: Backend> PixelClassifier<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let scores = self.proj.forward(x);
        if self.image_level {
            vec![scores.mean_dim(3).mean_dim(2)]
        } else {
            vec![scores]
        }
    }
}
