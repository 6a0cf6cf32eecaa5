// ============================================================
// Layer 5 — Metric Registry
// ============================================================
// Accumulating evaluation metrics, one independent set per mode.
//
//   MetricInput     host-side copy of (output, labels), adapted:
//                     K = 1  → one probability per location
//                     K > 1  → rows of K scores, class axis last
//                   labels are flattened to integer class indices;
//                   targets of other tasks are binned like the
//                   predictions (0.5 threshold, or clamped index)
//   ClassMetric     confusion-matrix accumulator behind the
//                   accuracy / precision / recall / f1 / iou names
//   MetricSet       name → accumulator, in configured order
//   MetricSets      { train, val, test }, never shared
//
// Binary metrics threshold at 0.5 and report the positive class.
// Multiclass metrics take the argmax and macro-average over the
// classes seen in predictions or labels; accuracy is always the
// fraction of correct locations. An empty accumulator reports 0.

use burn::prelude::*;

use crate::domain::config::ResolvedClasses;
use crate::domain::error::{HarnessError, Result};
use crate::domain::mode::Mode;

pub const METRIC_NAMES: [&str; 5] = ["accuracy", "precision", "recall", "f1", "iou"];

// ─── MetricInput ──────────────────────────────────────────────────────────────
/// Predictions and integer labels of one batch, on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricInput {
    /// Row-major [rows, classes] scores; `classes` = 1 for binary
    pub scores:  Vec<f32>,
    pub classes: usize,
    pub labels:  Vec<i64>,
}

impl MetricInput {
    /// Read back and reshape a detached `output` [N, K, H, W] and
    /// its `labels` [N, 1, H', W']. With `class_labels` every label
    /// must be a valid class index.
    pub fn from_tensors<B: Backend>(
        output:       Tensor<B, 4>,
        labels:       Tensor<B, 4>,
        classes:      ResolvedClasses,
        class_labels: bool,
    ) -> Result<Self> {
        let [n, k, h, w] = output.dims();
        if k != classes.get() {
            return Err(HarnessError::batch(format!(
                "model produced {k} channels, metrics expect {classes}"
            )));
        }

        let scores = output
            .permute([0, 2, 3, 1])
            .reshape([n * h * w * k])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| HarnessError::Tensor(format!("{e:?}")))?;

        let targets: Vec<f32> = labels
            .flatten::<1>(0, 3)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| HarnessError::Tensor(format!("{e:?}")))?;

        if targets.len() * k != scores.len() {
            return Err(HarnessError::batch(format!(
                "{} labels for {} predictions",
                targets.len(),
                scores.len() / k
            )));
        }

        let upper = if k == 1 { 2 } else { k as i64 };
        let labels: Vec<i64> = if class_labels {
            let labels: Vec<i64> = targets.iter().map(|&t| t as i64).collect();
            if let Some(bad) = labels.iter().find(|&&l| l < 0 || l >= upper) {
                return Err(HarnessError::batch(format!("label {bad} is outside 0..{upper}")));
            }
            labels
        } else if k == 1 {
            targets.iter().map(|&t| i64::from(t >= 0.5)).collect()
        } else {
            targets.iter().map(|&t| (t.round() as i64).clamp(0, upper - 1)).collect()
        };

        Ok(Self { scores, classes: k, labels })
    }

    /// Predicted class per row.
    fn predictions(&self) -> impl Iterator<Item = usize> + '_ {
        self.scores.chunks(self.classes).map(|row| {
            if row.len() == 1 {
                usize::from(row[0] >= 0.5)
            } else {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &s)| if s > best.1 { (i, s) } else { best })
                    .0
            }
        })
    }
}

// ─── Metric ───────────────────────────────────────────────────────────────────
/// A stateful accumulator.
pub trait Metric: Send {
    fn update(&mut self, input: &MetricInput);

    /// Aggregate value so far. Must not change state.
    fn compute(&self) -> f64;

    fn reset(&mut self);
}

/// Scores computed from one class's (tp, fp, fn).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassScore {
    Precision,
    Recall,
    F1,
    Iou,
}

impl ClassScore {
    fn of(self, (tp, fp, fn_): (u64, u64, u64)) -> f64 {
        match self {
            ClassScore::Precision => ratio(tp, tp + fp),
            ClassScore::Recall    => ratio(tp, tp + fn_),
            ClassScore::F1        => ratio(2 * tp, 2 * tp + fp + fn_),
            ClassScore::Iou       => ratio(tp, tp + fp + fn_),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Accuracy,
    PerClass(ClassScore),
}

impl MetricKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "accuracy"  => Ok(MetricKind::Accuracy),
            "precision" => Ok(MetricKind::PerClass(ClassScore::Precision)),
            "recall"    => Ok(MetricKind::PerClass(ClassScore::Recall)),
            "f1"        => Ok(MetricKind::PerClass(ClassScore::F1)),
            "iou" | "jaccard" => Ok(MetricKind::PerClass(ClassScore::Iou)),
            other => Err(HarnessError::config(format!(
                "unknown metric '{other}' (expected one of {})",
                METRIC_NAMES.join(", ")
            ))),
        }
    }
}

/// counts[truth * k + predicted]
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    k:      usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(k: usize) -> Self {
        Self { k, counts: vec![0; k * k] }
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        self.counts[truth * self.k + predicted] += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn at(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.k + predicted]
    }

    /// (tp, fp, fn) for one class.
    fn class_counts(&self, class: usize) -> (u64, u64, u64) {
        let tp = self.at(class, class);
        let predicted: u64 = (0..self.k).map(|t| self.at(t, class)).sum();
        let actual:    u64 = (0..self.k).map(|p| self.at(class, p)).sum();
        (tp, predicted - tp, actual - tp)
    }

    fn clear(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Confusion-matrix backed classification metric.
#[derive(Debug, Clone)]
pub struct ClassMetric {
    kind:   MetricKind,
    binary: bool,
    matrix: ConfusionMatrix,
}

impl ClassMetric {
    pub fn new(kind: MetricKind, classes: ResolvedClasses) -> Self {
        let binary = classes.is_binary();
        let k = if binary { 2 } else { classes.get() };
        Self { kind, binary, matrix: ConfusionMatrix::new(k) }
    }
}

impl Metric for ClassMetric {
    fn update(&mut self, input: &MetricInput) {
        for (predicted, &truth) in input.predictions().zip(&input.labels) {
            self.matrix.add(truth as usize, predicted);
        }
    }

    fn compute(&self) -> f64 {
        let total = self.matrix.total();
        if total == 0 {
            return 0.0;
        }
        let score = match self.kind {
            MetricKind::Accuracy => {
                let correct: u64 = (0..self.matrix.k).map(|c| self.matrix.at(c, c)).sum();
                return ratio(correct, total);
            }
            MetricKind::PerClass(score) => score,
        };
        if self.binary {
            return score.of(self.matrix.class_counts(1));
        }

        let present: Vec<(u64, u64, u64)> = (0..self.matrix.k)
            .map(|c| self.matrix.class_counts(c))
            .filter(|&(tp, fp, fn_)| tp + fp + fn_ > 0)
            .collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().map(|&c| score.of(c)).sum::<f64>() / present.len() as f64
    }

    fn reset(&mut self) {
        self.matrix.clear();
    }
}

// ─── MetricSet ────────────────────────────────────────────────────────────────
/// Named accumulators of one mode.
#[derive(Default)]
pub struct MetricSet {
    entries: Vec<(String, Box<dyn Metric>)>,
}

impl MetricSet {
    pub fn insert(&mut self, name: impl Into<String>, metric: Box<dyn Metric>) {
        self.entries.push((name.into(), metric));
    }

    pub fn update(&mut self, input: &MetricInput) {
        for (_, metric) in &mut self.entries {
            metric.update(input);
        }
    }

    /// Current value of every metric, in configured order.
    pub fn compute(&self) -> Vec<(String, f64)> {
        self.entries.iter().map(|(name, m)| (name.clone(), m.compute())).collect()
    }

    pub fn reset(&mut self) {
        for (_, metric) in &mut self.entries {
            metric.reset();
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One `MetricSet` per mode.
#[derive(Default)]
pub struct MetricSets {
    pub train: MetricSet,
    pub val:   MetricSet,
    pub test:  MetricSet,
}

impl MetricSets {
    pub fn get(&self, mode: Mode) -> &MetricSet {
        match mode {
            Mode::Train => &self.train,
            Mode::Val   => &self.val,
            Mode::Test  => &self.test,
        }
    }

    pub fn get_mut(&mut self, mode: Mode) -> &mut MetricSet {
        match mode {
            Mode::Train => &mut self.train,
            Mode::Val   => &mut self.val,
            Mode::Test  => &mut self.test,
        }
    }
}

pub fn build_metric(name: &str, classes: ResolvedClasses) -> Result<Box<dyn Metric>> {
    Ok(Box::new(ClassMetric::new(MetricKind::from_name(name)?, classes)))
}

/// Fresh, independent accumulators for every mode.
pub fn build_metric_sets(names: &[String], classes: ResolvedClasses) -> Result<MetricSets> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(HarnessError::config(format!("metric '{name}' is listed twice")));
        }
    }
    let mut sets = MetricSets::default();
    for mode in Mode::ALL {
        let set = sets.get_mut(mode);
        for name in names {
            set.insert(name.clone(), build_metric(name, classes)?);
        }
    }
    Ok(sets)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn classes(raw: usize) -> ResolvedClasses {
        ResolvedClasses::from_raw(raw).unwrap()
    }

    fn binary_input(probs: &[f32], labels: &[i64]) -> MetricInput {
        MetricInput { scores: probs.to_vec(), classes: 1, labels: labels.to_vec() }
    }

    fn metric(name: &str, raw: usize) -> Box<dyn Metric> {
        build_metric(name, classes(raw)).unwrap()
    }

    #[test]
    fn test_binary_statistics() {
        // tp = 2, fp = 1, fn = 1, tn = 1
        let input = binary_input(&[0.9, 0.7, 0.6, 0.2, 0.1], &[1, 1, 0, 1, 0]);
        let expect = [("accuracy", 0.6), ("precision", 2.0 / 3.0), ("recall", 2.0 / 3.0), ("f1", 2.0 / 3.0), ("iou", 0.5)];
        for (name, value) in expect {
            let mut m = metric(name, 2);
            m.update(&input);
            assert!((m.compute() - value).abs() < 1e-9, "{name}");
        }
    }

    #[test]
    fn test_multiclass_macro_average() {
        // truth 0,1,2,2 ; predicted 0,2,2,2
        let input = MetricInput {
            scores:  vec![0.8, 0.1, 0.1, 0.1, 0.2, 0.7, 0.0, 0.1, 0.9, 0.3, 0.3, 0.4],
            classes: 3,
            labels:  vec![0, 1, 2, 2],
        };
        let mut acc = metric("accuracy", 3);
        acc.update(&input);
        assert!((acc.compute() - 0.75).abs() < 1e-9);

        // per class recall: 1, 0, 1
        let mut recall = metric("recall", 3);
        recall.update(&input);
        assert!((recall.compute() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_compute_is_idempotent_and_reset_empties() {
        let mut m = metric("iou", 2);
        m.update(&binary_input(&[0.9, 0.1], &[1, 1]));
        let first = m.compute();
        assert_eq!(first, m.compute());

        m.reset();
        assert_eq!(m.compute(), 0.0);
    }

    #[test]
    fn test_unknown_and_duplicate_names() {
        assert!(matches!(build_metric("auroc", classes(3)), Err(HarnessError::Configuration(_))));
        let names = vec!["accuracy".to_string(), "accuracy".to_string()];
        assert!(build_metric_sets(&names, classes(3)).is_err());
    }

    #[test]
    fn test_sets_do_not_share_state() {
        let names = vec!["accuracy".to_string()];
        let mut sets = build_metric_sets(&names, classes(2)).unwrap();
        sets.get_mut(Mode::Train).update(&binary_input(&[0.9], &[1]));
        assert_eq!(sets.get(Mode::Train).compute()[0].1, 1.0);
        assert_eq!(sets.get(Mode::Val).compute()[0].1, 0.0);
        assert_eq!(sets.get(Mode::Test).names(), vec!["accuracy"]);
    }

    #[test]
    fn test_input_moves_class_axis_last() {
        let device = Default::default();
        // N=1, K=3, H=1, W=2: location 0 favours class 1, location 1 class 0
        let output = Tensor::<TestBackend, 1>::from_floats([0.1, 0.7, 0.8, 0.2, 0.1, 0.1], &device)
            .reshape([1, 3, 1, 2]);
        let labels = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0], &device).reshape([1, 1, 1, 2]);
        let input = MetricInput::from_tensors(output, labels, classes(3), true).unwrap();
        assert_eq!(input.scores, vec![0.1, 0.8, 0.1, 0.7, 0.2, 0.1]);
        assert_eq!(input.labels, vec![1, 0]);

        let mut acc = metric("accuracy", 3);
        acc.update(&input);
        assert_eq!(acc.compute(), 1.0);
    }

    #[test]
    fn test_input_rejects_out_of_range_labels() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 4>::zeros([1, 1, 1, 2], &device);
        let labels = Tensor::<TestBackend, 1>::from_floats([0.0, 3.0], &device).reshape([1, 1, 1, 2]);
        let err = MetricInput::from_tensors(output, labels, classes(1), true).unwrap_err();
        assert!(matches!(err, HarnessError::BatchFormat(_)));
    }

    #[test]
    fn test_real_valued_targets_are_binned() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 4>::ones([1, 1, 1, 3], &device);
        let labels = Tensor::<TestBackend, 1>::from_floats([2.5, 0.2, -1.0], &device).reshape([1, 1, 1, 3]);
        let input = MetricInput::from_tensors(output, labels, classes(1), false).unwrap();
        assert_eq!(input.labels, vec![1, 0, 0]);

        let output = Tensor::<TestBackend, 4>::ones([1, 3, 1, 2], &device);
        let labels = Tensor::<TestBackend, 1>::from_floats([7.0, 0.8], &device).reshape([1, 1, 1, 2]);
        let input = MetricInput::from_tensors(output, labels, classes(3), false).unwrap();
        assert_eq!(input.labels, vec![2, 1]);
    }
}
