// ============================================================
// Layer 5 — Shared Step
// ============================================================
// The one step function behind training, validation and test:
//
//   1. take x / labels / masks out of the batch (masks → ones)
//   2. adapt shapes for the task
//   3. forward → last output → final activation
//   4. per-element loss
//   5. reduce: masked mean over valid locations, or plain mean
//   6. log `{mode}_loss` (step + epoch; progress bar in training)
//   7. update the mode's metrics with the detached output (skipped
//      when the mode has none)
//
// A location is invalid when its mask is zero in ANY channel:
//
//   loss   = mean over channels of the per-element loss
//   valid  = Π_c mask[c] ≠ 0
//   result = Σ loss·valid / (#locations − #invalid + ε)
//
// ε keeps an all-invalid batch finite.

use burn::prelude::*;

use crate::data::adapt::{adapt_variables, AdaptSpec};
use crate::data::batcher::{Batch, BatchParts};
use crate::domain::config::ResolvedClasses;
use crate::domain::error::Result;
use crate::domain::mode::Mode;
use crate::domain::traits::{LogSink, ScalarEntry};
use crate::ml::loss::LossFn;
use crate::ml::metrics::{MetricInput, MetricSet};
use crate::ml::resolver::ResolvedModel;

pub const MASK_EPSILON: f64 = 1e-7;

/// Everything a step reads; nothing here is mutated by it.
pub struct StepContext<'a, B: Backend> {
    pub model:   &'a ResolvedModel<B>,
    pub loss:    &'a LossFn<B>,
    pub adapt:   &'a AdaptSpec,
    pub masked:  bool,
    pub classes: ResolvedClasses,
    /// Labels are class indices (Classification / Segmentation)
    pub class_labels: bool,
}

pub struct StepOutput<B: Backend> {
    /// Scalar loss, still attached to the graph in training
    pub loss:       Tensor<B, 1>,
    pub loss_value: f64,
    /// Post-activation output, detached
    pub output:     Tensor<B, 4>,
    pub labels:     Tensor<B, 4>,
}

/// Reduce a per-element loss [N, C, H, W] to a scalar.
pub fn reduce_loss<B: Backend>(loss: Tensor<B, 4>, masks: Tensor<B, 4>, masked: bool) -> Tensor<B, 1> {
    if !masked {
        return loss.mean();
    }
    let loss = loss.mean_dim(1);
    let locations: usize = loss.dims().iter().product();

    let invalid = masks
        .equal_elem(0.0)
        .int()
        .sum_dim(1)
        .greater_elem(0);
    let n_valid = invalid
        .clone()
        .int()
        .sum()
        .float()
        .neg()
        .add_scalar(locations as f64);

    // ε goes on the count itself; folded into `locations` it rounds away in f32
    let denominator = n_valid.add_scalar(MASK_EPSILON);
    loss.mask_fill(invalid, 0.0).sum() / denominator
}

pub fn shared_step<B: Backend>(
    ctx:     &StepContext<'_, B>,
    batch:   Batch<B>,
    mode:    Mode,
    metrics: &mut MetricSet,
    sink:    &mut dyn LogSink,
) -> Result<StepOutput<B>> {
    let parts = batch.into_parts()?;
    let BatchParts { x, masks, labels } = adapt_variables(ctx.adapt, parts)?;
    let batch_size = x.dims()[0];

    let output   = ctx.model.forward(x)?;
    let elements = ctx.loss.forward(output.clone(), labels.clone());
    let loss     = reduce_loss(elements, masks, ctx.masked);

    let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
    sink.log(ScalarEntry::step(mode, "loss", loss_value, batch_size).with_prog_bar(mode == Mode::Train));

    let output = output.detach();
    if !metrics.is_empty() {
        let input = MetricInput::from_tensors(output.clone(), labels.clone(), ctx.classes, ctx.class_labels)?;
        metrics.update(&input);
    }

    Ok(StepOutput { loss, loss_value, output, labels })
}
