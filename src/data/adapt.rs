// ============================================================
// Layer 4 — Variable Adaptation
// ============================================================
// Normalises the tensors of one batch for the configured task
// before the forward pass:
//
//   - every tensor must agree on the batch dimension and the
//     mask must have the shape of `x`
//   - image-level outputs (output_model_dim = 1) take exactly
//     one label per sample → labels [N, 1, 1, 1]; the mask is
//     reduced over the spatial axes by maximum, so a channel of
//     a sample counts as present if any location of it is
//   - pixel-level outputs need labels with the spatial extent
//     of `x`
//
// Shape problems are BatchFormat errors, not panics.

use burn::prelude::*;

use crate::data::batcher::BatchParts;
use crate::domain::config::{ExperimentConfig, Task};
use crate::domain::error::{HarnessError, Result};

/// What adaptation needs to know about the experiment.
#[derive(Debug, Clone)]
pub struct AdaptSpec {
    pub task:        Task,
    pub image_level: bool,
}

impl AdaptSpec {
    pub fn from_config(cfg: &ExperimentConfig) -> Self {
        Self { task: cfg.task.clone(), image_level: cfg.image_level_output() }
    }
}

pub fn adapt_variables<B: Backend>(spec: &AdaptSpec, parts: BatchParts<B>) -> Result<BatchParts<B>> {
    let BatchParts { x, masks, labels } = parts;
    let [n, _, h, w] = x.dims();

    if masks.dims() != x.dims() {
        return Err(HarnessError::batch(format!(
            "mask shape {:?} differs from x shape {:?}",
            masks.dims(), x.dims()
        )));
    }
    let [ln, lc, lh, lw] = labels.dims();
    if ln != n {
        return Err(HarnessError::batch(format!(
            "labels hold {ln} samples but x holds {n}"
        )));
    }
    if lc != 1 {
        return Err(HarnessError::batch(format!(
            "labels must carry one channel, got {lc}"
        )));
    }

    if spec.image_level {
        if lh * lw != 1 {
            return Err(HarnessError::batch(format!(
                "{} with image-level output expects one label per sample, got {lh}x{lw}",
                spec.task
            )));
        }
        let labels = labels.reshape([n, 1, 1, 1]);
        let masks  = masks.max_dim(3).max_dim(2);
        return Ok(BatchParts { x, masks, labels });
    }

    if (lh, lw) != (h, w) {
        return Err(HarnessError::batch(format!(
            "pixel-level labels {lh}x{lw} do not match input {h}x{w}"
        )));
    }
    Ok(BatchParts { x, masks, labels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn parts(label_shape: [usize; 4]) -> BatchParts<TestBackend> {
        let device = Default::default();
        BatchParts {
            x:      Tensor::ones([2, 3, 4, 4], &device),
            masks:  Tensor::ones([2, 3, 4, 4], &device),
            labels: Tensor::zeros(label_shape, &device),
        }
    }

    #[test]
    fn test_image_level_reduces_masks() {
        let spec = AdaptSpec { task: Task::Classification, image_level: true };
        let out  = adapt_variables(&spec, parts([2, 1, 1, 1])).unwrap();
        assert_eq!(out.masks.dims(), [2, 3, 1, 1]);
        assert_eq!(out.labels.dims(), [2, 1, 1, 1]);
    }

    #[test]
    fn test_pixel_level_keeps_shapes() {
        let spec = AdaptSpec { task: Task::Segmentation, image_level: false };
        let out  = adapt_variables(&spec, parts([2, 1, 4, 4])).unwrap();
        assert_eq!(out.masks.dims(), [2, 3, 4, 4]);
    }

    #[test]
    fn test_mismatched_labels_rejected() {
        let spec = AdaptSpec { task: Task::Segmentation, image_level: false };
        let err  = adapt_variables(&spec, parts([2, 1, 3, 3])).unwrap_err();
        assert!(matches!(err, HarnessError::BatchFormat(_)));

        let spec = AdaptSpec { task: Task::Classification, image_level: true };
        assert!(adapt_variables(&spec, parts([2, 1, 4, 4])).is_err());
        assert!(adapt_variables(&spec, parts([3, 1, 1, 1])).is_err());
    }
}
