// ============================================================
// Layer 5 — Model Zoo
// ============================================================
// Built-in architectures the resolver can hand out:
//
//   signal.rs        1D models, namespace `tsai`
//                      FCN  conv1d stack + global average pool
//                      MLP  flatten + fully connected layers
//   segmentation.rs  2D factories
//                      Unet encoder/decoder with skip connections
//                      FCN  same-resolution conv stack
//   user.rs          models for the user namespace
//
// Every model takes [batch, channels, height, width] input and
// returns a list of outputs. Models with an auxiliary
// classification head return [mask, label]; by convention the
// LAST output is the primary one.
//
// `Network` wraps whichever model was resolved so the optimizer
// and the step see one concrete Module type.

pub mod segmentation;
pub mod signal;
pub mod user;

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};

pub use segmentation::{Fcn2d, Fcn2dConfig, Unet, UnetConfig};
pub use signal::{SignalFcn, SignalFcnConfig, SignalMlp, SignalMlpConfig};
pub use user::{PixelClassifier, PixelClassifierConfig};

// ─── Auxiliary head ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    Avg,
    Max,
}

/// Parameters of the image-level head attached to 2D models.
#[derive(Config, Debug)]
pub struct AuxParams {
    pub pooling: Pooling,
    pub classes: usize,
}

impl AuxParams {
    pub fn init<B: Backend>(&self, channels: usize, device: &B::Device) -> ClassificationHead<B> {
        ClassificationHead {
            linear:  LinearConfig::new(channels, self.classes).init(device),
            use_max: self.pooling == Pooling::Max,
        }
    }
}

/// Global pooling + linear layer: [N, C, H, W] → [N, K, 1, 1]
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    pub linear:  Linear<B>,
    pub use_max: bool,
}

impl<B: Backend> ClassificationHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, _, _] = x.dims();
        let pooled = if self.use_max {
            x.max_dim(3).max_dim(2)
        } else {
            x.mean_dim(3).mean_dim(2)
        };
        let logits = self.linear.forward(pooled.reshape([n, c]));
        let [_, k] = logits.dims();
        logits.reshape([n, k, 1, 1])
    }
}

// ─── Network ──────────────────────────────────────────────────────────────────
/// The resolved architecture. Exactly one slot is populated;
/// build it through the `From` impls.
#[derive(Module, Debug)]
pub struct Network<B: Backend> {
    signal_fcn: Option<SignalFcn<B>>,
    signal_mlp: Option<SignalMlp<B>>,
    unet:       Option<Unet<B>>,
    fcn:        Option<Fcn2d<B>>,
    pixel:      Option<PixelClassifier<B>>,
}

impl<B: Backend> Network<B> {
    fn empty() -> Self {
        Self { signal_fcn: None, signal_mlp: None, unet: None, fcn: None, pixel: None }
    }

    /// All outputs of the wrapped model, primary output last.
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        if let Some(m) = &self.signal_fcn {
            return m.forward(x);
        }
        if let Some(m) = &self.signal_mlp {
            return m.forward(x);
        }
        if let Some(m) = &self.unet {
            return m.forward(x);
        }
        if let Some(m) = &self.fcn {
            return m.forward(x);
        }
        if let Some(m) = &self.pixel {
            return m.forward(x);
        }
        Vec::new()
    }

    /// Short name of the wrapped architecture.
    pub fn kind(&self) -> &'static str {
        if self.signal_fcn.is_some() { "tsai.FCN" }
        else if self.signal_mlp.is_some() { "tsai.MLP" }
        else if self.unet.is_some() { "Unet" }
        else if self.fcn.is_some() { "FCN" }
        else if self.pixel.is_some() { "PixelClassifier" }
        else { "empty" }
    }
}

impl<B: Backend> From<SignalFcn<B>> for Network<B> {
    fn from(m: SignalFcn<B>) -> Self {
        Self { signal_fcn: Some(m), ..Self::empty() }
    }
}

impl<B: Backend> From<SignalMlp<B>> for Network<B> {
    fn from(m: SignalMlp<B>) -> Self {
        Self { signal_mlp: Some(m), ..Self::empty() }
    }
}

impl<B: Backend> From<Unet<B>> for Network<B> {
    fn from(m: Unet<B>) -> Self {
        Self { unet: Some(m), ..Self::empty() }
    }
}

impl<B: Backend> From<Fcn2d<B>> for Network<B> {
    fn from(m: Fcn2d<B>) -> Self {
        Self { fcn: Some(m), ..Self::empty() }
    }
}

impl<B: Backend> From<PixelClassifier<B>> for Network<B> {
    fn from(m: PixelClassifier<B>) -> Self {
        Self { pixel: Some(m), ..Self::empty() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_classification_head_shapes() {
        let device = Default::default();
        for pooling in [Pooling::Avg, Pooling::Max] {
            let head = AuxParams::new(pooling, 3).init::<TestBackend>(8, &device);
            let out  = head.forward(Tensor::ones([2, 8, 4, 4], &device));
            assert_eq!(out.dims(), [2, 3, 1, 1]);
        }
    }

    #[test]
    fn test_network_dispatches_to_wrapped_model() {
        let device = Default::default();
        let net: Network<TestBackend> = PixelClassifierConfig::new(3, 2, false).init(&device).into();
        assert_eq!(net.kind(), "PixelClassifier");
        let outs = net.forward(Tensor::zeros([1, 3, 5, 5], &device));
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].dims(), [1, 2, 5, 5]);
    }
}
