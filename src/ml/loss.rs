// ============================================================
// Layer 5 — Loss Resolution
// ============================================================
// Builds the per-element loss named by `implementation.loss`.
//
//   CrossEntropyLoss  −w[y]·log p[y]         needs K > 1
//   BCELoss           −w·(y·log p + (1−y)·log(1−p))
//   MSELoss           (p − y)²
//   L1Loss            |p − y|
//
// All losses read the post-activation output and return an
// UNREDUCED tensor; the step decides how to reduce it (masked or
// plain mean). Logs are clamped at −100 so a hard 0/1 prediction
// never produces an infinite loss.
//
// `params.weight` (class weights) is accepted by the two
// class-labelled losses and bound as a tensor at resolution.
// A binary BCELoss also takes [w_neg, w_pos], picked per location
// by its label.

use burn::{prelude::*, tensor::backend::AutodiffBackend};

use crate::domain::config::{LossSpec, ParamReader, ResolvedClasses};
use crate::domain::error::{HarnessError, Result};

const LOG_FLOOR: f32 = -100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    CrossEntropy,
    BinaryCrossEntropy,
    MeanSquared,
    MeanAbsolute,
}

impl LossKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "CrossEntropyLoss" => Ok(LossKind::CrossEntropy),
            "BCELoss"          => Ok(LossKind::BinaryCrossEntropy),
            "MSELoss"          => Ok(LossKind::MeanSquared),
            "L1Loss"           => Ok(LossKind::MeanAbsolute),
            other => Err(HarnessError::config(format!(
                "unknown loss '{other}' (expected CrossEntropyLoss, BCELoss, MSELoss or L1Loss)"
            ))),
        }
    }

    fn accepts_weight(self) -> bool {
        matches!(self, LossKind::CrossEntropy | LossKind::BinaryCrossEntropy)
    }
}

/// A resolved loss with its bound class weights.
#[derive(Debug, Clone)]
pub struct LossFn<B: Backend> {
    pub kind:   LossKind,
    pub weight: Option<Tensor<B, 1>>,
}

impl<B: Backend> LossFn<B> {
    /// Per-element loss of `output` [N, K, H, W] against `labels`
    /// [N, 1, H, W]. Class-index losses return [N, 1, H, W]; the
    /// others return the broadcast shape of their inputs.
    pub fn forward(&self, output: Tensor<B, 4>, labels: Tensor<B, 4>) -> Tensor<B, 4> {
        match self.kind {
            LossKind::CrossEntropy       => self.cross_entropy(output, labels),
            LossKind::BinaryCrossEntropy => self.binary_cross_entropy(output, labels),
            LossKind::MeanSquared        => (output - labels).powf_scalar(2.0),
            LossKind::MeanAbsolute       => (output - labels).abs(),
        }
    }

    fn cross_entropy(&self, output: Tensor<B, 4>, labels: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, _, h, w] = output.dims();
        let index    = labels.int();
        let log_prob = output.log().clamp_min(LOG_FLOOR).gather(1, index.clone());
        let nll      = log_prob.neg();

        match &self.weight {
            Some(weight) => {
                let per_location = weight
                    .clone()
                    .select(0, index.reshape([n * h * w]))
                    .reshape([n, 1, h, w]);
                nll * per_location
            }
            None => nll,
        }
    }

    fn binary_cross_entropy(&self, output: Tensor<B, 4>, labels: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, k, _, _] = output.dims();
        let labels_shape = labels.dims();
        let target = if k == 1 { labels } else { one_hot(labels, k) };

        let log_p  = output.clone().log().clamp_min(LOG_FLOOR);
        let log_1p = output.neg().add_scalar(1.0).log().clamp_min(LOG_FLOOR);
        let loss   = (target.clone() * log_p + target.clone().neg().add_scalar(1.0) * log_1p).neg();

        match &self.weight {
            Some(weight) if k == 1 && weight.dims()[0] == 2 => {
                let [n, _, h, w] = labels_shape;
                let per_location = weight
                    .clone()
                    .select(0, target.greater_equal_elem(0.5).int().reshape([n * h * w]))
                    .reshape([n, 1, h, w]);
                loss * per_location
            }
            Some(weight) => {
                let len = weight.dims()[0];
                loss * weight.clone().reshape([1, len, 1, 1])
            }
            None => loss,
        }
    }
}

impl<B: AutodiffBackend> LossFn<B> {
    pub fn valid(&self) -> LossFn<B::InnerBackend> {
        LossFn { kind: self.kind, weight: self.weight.as_ref().map(|w| w.clone().inner()) }
    }
}

/// Class indices [N, 1, H, W] → one-hot targets [N, K, H, W].
fn one_hot<B: Backend>(labels: Tensor<B, 4>, k: usize) -> Tensor<B, 4> {
    let classes = Tensor::<B, 1, Int>::arange(0..k as i64, &labels.device())
        .float()
        .reshape([1, k, 1, 1]);
    (labels - classes).abs().lower_elem(0.5).float()
}

/// Resolve the configured loss for `classes` output channels.
pub fn resolve_loss<B: Backend>(
    spec:    &LossSpec,
    classes: ResolvedClasses,
    device:  &B::Device,
) -> Result<LossFn<B>> {
    let kind   = LossKind::from_name(&spec.kind)?;
    let reader = ParamReader::new(&spec.params, "implementation.loss.params");

    let known: &[&str] = if kind.accepts_weight() { &["weight"] } else { &[] };
    let unknown = reader.unknown_keys(known);
    if !unknown.is_empty() {
        return Err(HarnessError::config(format!(
            "{} does not accept parameter(s) {}",
            spec.kind,
            unknown.join(", ")
        )));
    }

    if kind == LossKind::CrossEntropy && classes.is_binary() {
        return Err(HarnessError::config(
            "CrossEntropyLoss needs more than one output channel; use BCELoss for binary tasks",
        ));
    }

    let weight = match reader.f32_list("weight")? {
        Some(values) => {
            let k = classes.get();
            let ok = match kind {
                LossKind::CrossEntropy => values.len() == k,
                _ => values.len() == 1 || values.len() == k || (classes.is_binary() && values.len() == 2),
            };
            if !ok {
                return Err(HarnessError::config(format!(
                    "{} weight has {} entries for {k} output channel(s)",
                    spec.kind,
                    values.len()
                )));
            }
            Some(Tensor::<B, 1>::from_floats(values.as_slice(), device))
        }
        None => None,
    };

    tracing::debug!("Resolved loss {:?} (weighted: {})", kind, weight.is_some());
    Ok(LossFn { kind, weight })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::Params;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn spec(kind: &str, params: serde_json::Value) -> LossSpec {
        let params: Params = serde_json::from_value(params).unwrap();
        LossSpec { kind: kind.to_string(), params, masked: false }
    }

    fn classes(raw: usize) -> ResolvedClasses {
        ResolvedClasses::from_raw(raw).unwrap()
    }

    fn total(t: Tensor<TestBackend, 4>) -> f32 {
        t.sum().into_scalar()
    }

    #[test]
    fn test_weighted_cross_entropy_is_zero_on_exact_prediction() {
        let device = Default::default();
        let loss = resolve_loss::<TestBackend>(
            &spec("CrossEntropyLoss", serde_json::json!({ "weight": [0.2, 1.0, 3.0] })),
            classes(3),
            &device,
        )
        .unwrap();

        // one pixel per class, prediction is the one-hot label
        let labels = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, 2.0], &device).reshape([3, 1, 1, 1]);
        let output = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &device,
        )
        .reshape([3, 3, 1, 1]);

        let per_element = loss.forward(output, labels);
        assert_eq!(per_element.dims(), [3, 1, 1, 1]);
        assert!(total(per_element).abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_applies_class_weight() {
        let device = Default::default();
        let loss = resolve_loss::<TestBackend>(
            &spec("CrossEntropyLoss", serde_json::json!({ "weight": [1.0, 2.0, 1.0] })),
            classes(3),
            &device,
        )
        .unwrap();
        let labels = Tensor::<TestBackend, 4>::ones([1, 1, 1, 1], &device);
        let output = Tensor::<TestBackend, 1>::from_floats([0.25, 0.5, 0.25], &device).reshape([1, 3, 1, 1]);
        let value  = total(loss.forward(output, labels));
        assert!((value - 2.0 * std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_bce_clamps_hard_mistakes() {
        let device = Default::default();
        let loss = resolve_loss::<TestBackend>(&spec("BCELoss", serde_json::json!({})), classes(2), &device).unwrap();
        let output = Tensor::<TestBackend, 4>::zeros([1, 1, 1, 2], &device);
        let labels = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0], &device).reshape([1, 1, 1, 2]);
        let values: Vec<f32> = loss.forward(output, labels).into_data().to_vec().unwrap();
        assert!((values[0] - 100.0).abs() < 1e-3);
        assert!(values[1].abs() < 1e-6);
    }

    #[test]
    fn test_binary_bce_takes_per_class_weight() {
        let device = Default::default();
        let loss = resolve_loss::<TestBackend>(
            &spec("BCELoss", serde_json::json!({ "weight": [1.0, 2.0] })),
            classes(2),
            &device,
        )
        .unwrap();

        let labels = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0], &device).reshape([1, 1, 1, 2]);
        assert!(total(loss.forward(labels.clone(), labels.clone())).abs() < 1e-6);

        // p = 0.5 everywhere: ln 2 per location, weighted by w[y]
        let output = Tensor::<TestBackend, 4>::full([1, 1, 1, 2], 0.5, &device);
        let values: Vec<f32> = loss.forward(output, labels).into_data().to_vec().unwrap();
        assert!((values[0] - 2.0 * std::f32::consts::LN_2).abs() < 1e-5);
        assert!((values[1] - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_bce_one_hot_for_multichannel_output() {
        let device = Default::default();
        let loss = resolve_loss::<TestBackend>(&spec("BCELoss", serde_json::json!({})), classes(3), &device).unwrap();
        let output = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, 0.0], &device).reshape([1, 3, 1, 1]);
        let labels = Tensor::<TestBackend, 4>::ones([1, 1, 1, 1], &device);
        assert!(total(loss.forward(output, labels)).abs() < 1e-6);
    }

    #[test]
    fn test_regression_losses() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0], &device).reshape([1, 1, 1, 2]);
        let labels = Tensor::<TestBackend, 1>::from_floats([2.0, 1.0], &device).reshape([1, 1, 1, 2]);

        let mse = resolve_loss::<TestBackend>(&spec("MSELoss", serde_json::json!({})), classes(1), &device).unwrap();
        assert!((total(mse.forward(output.clone(), labels.clone())) - 5.0).abs() < 1e-6);

        let l1 = resolve_loss::<TestBackend>(&spec("L1Loss", serde_json::json!({})), classes(1), &device).unwrap();
        assert!((total(l1.forward(output, labels)) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_resolution_errors() {
        let device = Default::default();
        let cases = [
            spec("FocalLoss", serde_json::json!({})),
            spec("MSELoss", serde_json::json!({ "weight": [1.0] })),
            spec("CrossEntropyLoss", serde_json::json!({ "weight": [1.0, 2.0] })),
            spec("CrossEntropyLoss", serde_json::json!({ "ignore_index": 0 })),
        ];
        for case in &cases {
            let err = resolve_loss::<TestBackend>(case, classes(3), &device).unwrap_err();
            assert!(matches!(err, HarnessError::Configuration(_)), "{}", case.kind);
        }
        let binary_ce = resolve_loss::<TestBackend>(&spec("CrossEntropyLoss", serde_json::json!({})), classes(2), &device);
        assert!(binary_ce.is_err());
        let long_weight = resolve_loss::<TestBackend>(
            &spec("BCELoss", serde_json::json!({ "weight": [1.0, 2.0, 3.0] })),
            classes(2),
            &device,
        );
        assert!(matches!(long_weight, Err(HarnessError::Configuration(_))));
    }
}
