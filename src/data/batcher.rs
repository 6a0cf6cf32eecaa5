// ============================================================
// Layer 4 — Sample Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<Sample> into
// one `Batch` of rank-4 tensors:
//
//   x      → [batch, channels, height, width]
//   labels → [batch, 1, label_h, label_w]
//   masks  → [batch, channels, height, width]   (optional)
//
// Samples are flattened one after another and the flat buffer
// is reshaped, exactly like the token batcher this grew from:
//   [s1_c1_p1, ..., s1_cC_pP, s2_c1_p1, ...] → [N, C, H, W]
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::Sample;
use crate::domain::error::{HarnessError, Result};

// ─── Batch ────────────────────────────────────────────────────────────────────
/// A mini-batch as handed to the shared step.
///
/// `x` and `labels` are required by the step; they are optional
/// here so a malformed batch reaches the step and fails there
/// with a BatchFormat error instead of panicking in the loader.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    pub x:      Option<Tensor<B, 4>>,
    pub labels: Option<Tensor<B, 4>>,
    pub masks:  Option<Tensor<B, 4>>,
}

/// The three tensors of a well-formed batch.
#[derive(Debug, Clone)]
pub struct BatchParts<B: Backend> {
    pub x:      Tensor<B, 4>,
    pub masks:  Tensor<B, 4>,
    pub labels: Tensor<B, 4>,
}

impl<B: Backend> Batch<B> {
    pub fn new(x: Tensor<B, 4>, labels: Tensor<B, 4>) -> Self {
        Self { x: Some(x), labels: Some(labels), masks: None }
    }

    pub fn with_masks(mut self, masks: Tensor<B, 4>) -> Self {
        self.masks = Some(masks);
        self
    }

    /// Number of samples, if `x` is present.
    pub fn size(&self) -> Option<usize> {
        self.x.as_ref().map(|x| x.dims()[0])
    }

    /// Pull out `x`, `labels` and `masks`. An absent mask
    /// becomes all ones in the shape of `x`.
    pub fn into_parts(self) -> Result<BatchParts<B>> {
        let x = self.x
            .ok_or_else(|| HarnessError::batch("batch has no `x` tensor"))?;
        let labels = self.labels
            .ok_or_else(|| HarnessError::batch("batch has no `labels` tensor"))?;
        let masks = match self.masks {
            Some(m) => m,
            None    => Tensor::ones(x.shape(), &x.device()),
        };
        Ok(BatchParts { x, masks, labels })
    }
}

// ─── SampleBatcher ────────────────────────────────────────────────────────────
/// Holds the target device so tensors land on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct SampleBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SampleBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(&self, flat: Vec<f32>, shape: [usize; 4]) -> Tensor<B, 4> {
        Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device).reshape(shape)
    }
}

impl<B: Backend> Batcher<Sample, Batch<B>> for SampleBatcher<B> {
    /// Samples in one dataset share a shape (checked by
    /// `SampleDataset::new`), so the first one fixes it.
    fn batch(&self, items: Vec<Sample>) -> Batch<B> {
        let n            = items.len();
        let [c, h, w]    = items[0].shape;
        let [lh, lw]     = items[0].label_shape;

        // ── x ────────────────────────────────────────────────────────────────
        let x_flat: Vec<f32> = items.iter().flat_map(|s| s.x.iter().copied()).collect();
        let x = self.stack(x_flat, [n, c, h, w]);

        // ── labels: present only if every sample carries them ────────────────
        let labels = if items.iter().all(|s| s.labels.is_some()) {
            let flat: Vec<f32> = items
                .iter()
                .flat_map(|s| s.labels.iter().flatten().copied())
                .collect();
            Some(self.stack(flat, [n, 1, lh, lw]))
        } else {
            None
        };

        // ── masks: a sample without one counts as fully valid ────────────────
        let masks = if items.iter().any(|s| s.mask.is_some()) {
            let flat: Vec<f32> = items
                .iter()
                .flat_map(|s| match &s.mask {
                    Some(m) => m.clone(),
                    None    => vec![1.0; s.numel()],
                })
                .collect();
            Some(self.stack(flat, [n, c, h, w]))
        } else {
            None
        };

        Batch { x: Some(x), labels, masks }
    }
}
