// 1D models for the `tsai` namespace. Input arrives as
// [N, C, 1, L] and is viewed as [N, C, L] internally; output is
// one image-level prediction [N, c_out, 1, 1].

use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Linear, LinearConfig, PaddingConfig1d,
    },
    prelude::*,
    tensor::activation::relu,
};

// ─── FCN ──────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct SignalFcnConfig {
    pub c_in:         usize,
    pub c_out:        usize,
    pub layers:       Vec<usize>,
    pub kernel_sizes: Vec<usize>,
}

impl SignalFcnConfig {
    /// `layers` and `kernel_sizes` must have equal length and odd
    /// kernels (same padding); the resolver checks both.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SignalFcn<B> {
        let mut convs  = Vec::with_capacity(self.layers.len());
        let mut c_prev = self.c_in;
        for (&width, &kernel) in self.layers.iter().zip(&self.kernel_sizes) {
            convs.push(
                Conv1dConfig::new(c_prev, width, kernel)
                    .with_padding(PaddingConfig1d::Same)
                    .init(device),
            );
            c_prev = width;
        }
        let head = LinearConfig::new(c_prev, self.c_out).init(device);
        SignalFcn { convs, head }
    }
}

#[derive(Module, Debug)]
pub struct SignalFcn<B: Backend> {
    pub convs: Vec<Conv1d<B>>,
    pub head:  Linear<B>,
}

impl<B: Backend> SignalFcn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let [n, c, h, l] = x.dims();
        let mut y = x.reshape([n, c, h * l]);
        for conv in &self.convs {
            y = relu(conv.forward(y));
        }
        // Global average pooling over time
        let [_, width, _] = y.dims();
        let pooled = y.mean_dim(2).reshape([n, width]);
        let logits = self.head.forward(pooled);
        let [_, k] = logits.dims();
        vec![logits.reshape([n, k, 1, 1])]
    }
}

// ─── MLP ──────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct SignalMlpConfig {
    pub c_in:    usize,
    pub c_out:   usize,
    pub seq_len: usize,
    pub layers:  Vec<usize>,
}

impl SignalMlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SignalMlp<B> {
        let mut hidden = Vec::with_capacity(self.layers.len());
        let mut d_prev = self.c_in * self.seq_len;
        for &width in &self.layers {
            hidden.push(LinearConfig::new(d_prev, width).init(device));
            d_prev = width;
        }
        let head = LinearConfig::new(d_prev, self.c_out).init(device);
        SignalMlp { hidden, head }
    }
}

#[derive(Module, Debug)]
pub struct SignalMlp<B: Backend> {
    pub hidden: Vec<Linear<B>>,
    pub head:   Linear<B>,
}

impl<B: Backend> SignalMlp<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let [n, c, h, l] = x.dims();
        let mut y = x.reshape([n, c * h * l]);
        for layer in &self.hidden {
            y = relu(layer.forward(y));
        }
        let logits = self.head.forward(y);
        let [_, k] = logits.dims();
        vec![logits.reshape([n, k, 1, 1])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_fcn_output_is_image_level() {
        let device = Default::default();
        let model  = SignalFcnConfig::new(2, 4, vec![8, 8], vec![5, 3]).init::<TestBackend>(&device);
        let outs   = model.forward(Tensor::ones([3, 2, 1, 16], &device));
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].dims(), [3, 4, 1, 1]);
    }

    #[test]
    fn test_mlp_flattens_channels_and_time() {
        let device = Default::default();
        let model  = SignalMlpConfig::new(2, 1, 10, vec![6]).init::<TestBackend>(&device);
        let outs   = model.forward(Tensor::ones([4, 2, 1, 10], &device));
        assert_eq!(outs[0].dims(), [4, 1, 1, 1]);
    }
}
