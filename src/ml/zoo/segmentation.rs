// 2D models created by name. Both keep the input resolution for
// the mask output; with `aux` set they also return an
// image-level prediction from the deepest features, last.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use super::{AuxParams, ClassificationHead};

fn conv3x3<B: Backend>(c_in: usize, c_out: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([c_in, c_out], [3, 3])
        .with_padding(PaddingConfig2d::Same)
        .init(device)
}

// ─── ConvBlock ────────────────────────────────────────────────────────────────
/// Two 3x3 convolutions with ReLU, resolution preserved.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(c_in: usize, c_out: usize, device: &B::Device) -> Self {
        Self { conv1: conv3x3(c_in, c_out, device), conv2: conv3x3(c_out, c_out, device) }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv2.forward(relu(self.conv1.forward(x))))
    }
}

// ─── Unet ─────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct UnetConfig {
    pub in_channels:   usize,
    pub classes:       usize,
    /// Number of 2x downsamplings; H and W must divide by 2^depth
    pub encoder_depth: usize,
    /// Channels of the first stage, doubled at every level
    pub base_channels: usize,
    pub aux:           Option<AuxParams>,
}

impl UnetConfig {
    fn channels(&self, level: usize) -> usize {
        self.base_channels << level
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Unet<B> {
        let depth = self.encoder_depth;

        let mut encoder = Vec::with_capacity(depth + 1);
        let mut c_prev  = self.in_channels;
        for level in 0..=depth {
            encoder.push(ConvBlock::new(c_prev, self.channels(level), device));
            c_prev = self.channels(level);
        }

        // upsamplers[i] / decoder[i] bring level i+1 back to level i
        let upsamplers = (0..depth)
            .map(|i| {
                ConvTranspose2dConfig::new([self.channels(i + 1), self.channels(i)], [2, 2])
                    .with_stride([2, 2])
                    .init(device)
            })
            .collect();
        let decoder = (0..depth)
            .map(|i| ConvBlock::new(2 * self.channels(i), self.channels(i), device))
            .collect();

        let head = Conv2dConfig::new([self.channels(0), self.classes], [1, 1]).init(device);
        let aux  = self.aux.as_ref().map(|a| a.init(self.channels(depth), device));

        Unet {
            encoder,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            upsamplers,
            decoder,
            head,
            aux,
        }
    }
}

#[derive(Module, Debug)]
pub struct Unet<B: Backend> {
    pub encoder:    Vec<ConvBlock<B>>,
    pub pool:       MaxPool2d,
    pub upsamplers: Vec<ConvTranspose2d<B>>,
    pub decoder:    Vec<ConvBlock<B>>,
    pub head:       Conv2d<B>,
    pub aux:        Option<ClassificationHead<B>>,
}

impl<B: Backend> Unet<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        // ── Encoder: keep every level for the skip connections ────────────────
        let mut skips = Vec::with_capacity(self.encoder.len());
        let mut y = x;
        for (level, stage) in self.encoder.iter().enumerate() {
            if level > 0 {
                y = self.pool.forward(y);
            }
            y = stage.forward(y);
            skips.push(y.clone());
        }
        let bottleneck = y.clone();

        // ── Decoder: upsample, concat skip, convolve ──────────────────────────
        for level in (0..self.decoder.len()).rev() {
            let up = self.upsamplers[level].forward(y);
            y = self.decoder[level].forward(Tensor::cat(vec![up, skips[level].clone()], 1));
        }

        let mask = self.head.forward(y);
        match &self.aux {
            Some(head) => vec![mask, head.forward(bottleneck)],
            None       => vec![mask],
        }
    }
}

// ─── FCN ──────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct Fcn2dConfig {
    pub in_channels:     usize,
    pub classes:         usize,
    pub hidden_channels: usize,
    pub depth:           usize,
    pub aux:             Option<AuxParams>,
}

impl Fcn2dConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Fcn2d<B> {
        let mut convs  = Vec::with_capacity(self.depth);
        let mut c_prev = self.in_channels;
        for _ in 0..self.depth {
            convs.push(conv3x3(c_prev, self.hidden_channels, device));
            c_prev = self.hidden_channels;
        }
        Fcn2d {
            convs,
            head: Conv2dConfig::new([c_prev, self.classes], [1, 1]).init(device),
            aux:  self.aux.as_ref().map(|a| a.init(c_prev, device)),
        }
    }
}

#[derive(Module, Debug)]
pub struct Fcn2d<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub head:  Conv2d<B>,
    pub aux:   Option<ClassificationHead<B>>,
}

impl<B: Backend> Fcn2d<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut y = x;
        for conv in &self.convs {
            y = relu(conv.forward(y));
        }
        let mask = self.head.forward(y.clone());
        match &self.aux {
            Some(head) => vec![mask, head.forward(y)],
            None       => vec![mask],
        }
    }
}
