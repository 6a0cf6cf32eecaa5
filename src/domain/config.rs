// ============================================================
// Layer 3 — Experiment Configuration
// ============================================================
// The validated, in-memory form of one experiment YAML file.
//
// Layout mirrors the file on disk:
//
//   task: Segmentation
//   data:           { num_classes, features_selected, ... }
//   arch:           { user_defined, type, input_model_dim,
//                     output_model_dim, args | params }
//   implementation: { loss, metrics, optimizer, trainer }
//
// `arch.args` (1D models) and `arch.params` (2D models) are
// free-form maps; they are read through `ParamReader` so a
// wrong type surfaces as a Configuration error naming the key.
//
// The class count is resolved once through `resolved_classes`
// and handed around as the `ResolvedClasses` newtype. A raw
// value of 2 collapses to 1: binary tasks use a single logit.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::{HarnessError, Result};

/// Free-form keyword arguments for models and losses.
pub type Params = serde_json::Map<String, Value>;

// ─── Task ─────────────────────────────────────────────────────────────────────
/// The supervised objective. Anything not recognised is kept
/// verbatim as `Other` and gets no final activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Task {
    Classification,
    Segmentation,
    Other(String),
}

impl Task {
    /// Tasks whose labels are class indices.
    pub fn is_class_labelled(&self) -> bool {
        matches!(self, Task::Classification | Task::Segmentation)
    }
}

impl From<String> for Task {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Classification" => Task::Classification,
            "Segmentation"   => Task::Segmentation,
            _                => Task::Other(s),
        }
    }
}

impl From<Task> for String {
    fn from(t: Task) -> Self {
        t.to_string()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => f.write_str("Classification"),
            Task::Segmentation   => f.write_str("Segmentation"),
            Task::Other(name)    => f.write_str(name),
        }
    }
}

// ─── Sections ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub task: Task,

    /// Root folder for experiment outputs. Rewritten to the
    /// experiment's own folder by the bootstrap step.
    #[serde(default = "default_save_path")]
    pub save_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,

    pub data:           DataSpec,
    pub arch:           ArchSpec,
    pub implementation: ImplementationSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSpec {
    pub num_classes:       usize,
    pub features_selected: Vec<String>,

    /// Number of generated samples when no dataset is wired in
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Spatial extent of 2D inputs
    #[serde(default = "default_side")]
    pub height: usize,
    #[serde(default = "default_side")]
    pub width:  usize,

    /// Sequence length of 1D inputs
    #[serde(default = "default_length")]
    pub length: usize,

    #[serde(default)]
    pub split: SplitSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSpec {
    pub train: f64,
    pub val:   f64,
}

impl Default for SplitSpec {
    fn default() -> Self {
        Self { train: 0.7, val: 0.15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchSpec {
    /// Look `type` up in the user-model namespace instead of the zoo
    pub user_defined: bool,

    /// Selector: `namespace.Symbol` for 1D, a factory name for 2D,
    /// or a user-model key
    #[serde(rename = "type")]
    pub kind: String,

    pub input_model_dim:  usize,
    pub output_model_dim: usize,

    /// Keyword arguments for 1D models
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub args: Params,

    /// Extra factory parameters for 2D models
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: Params,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationSpec {
    pub loss:      LossSpec,
    pub metrics:   Vec<String>,
    pub optimizer: OptimizerSpec,
    pub trainer:   TrainerSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossSpec {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub params: Params,

    /// Exclude locations whose mask is zero in any channel
    #[serde(default)]
    pub masked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSpec {
    pub lr:           f64,
    pub weight_decay: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSpec {
    pub batch_size: usize,
    pub monitor:    MonitorSpec,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub metric: String,
}

fn default_save_path()   -> String { "runs/".to_string() }
fn default_num_samples() -> usize  { 64 }
fn default_side()        -> usize  { 16 }
fn default_length()      -> usize  { 32 }
fn default_epochs()      -> usize  { 10 }
fn default_seed()        -> u64    { 42 }

// ─── ResolvedClasses ──────────────────────────────────────────────────────────
/// Effective class count: the number of output channels the
/// model produces and metrics expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedClasses(usize);

impl ResolvedClasses {
    /// Collapse a raw class count. 2 becomes 1 (single logit).
    pub fn from_raw(raw: usize) -> Result<Self> {
        match raw {
            0 => Err(HarnessError::config("data.num_classes must be at least 1")),
            2 => Ok(Self(1)),
            n => Ok(Self(n)),
        }
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn is_binary(self) -> bool {
        self.0 == 1
    }
}

impl fmt::Display for ResolvedClasses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── ExperimentConfig ─────────────────────────────────────────────────────────
impl ExperimentConfig {
    /// Parse a YAML document. Missing or mistyped keys are
    /// Configuration errors.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)
            .map_err(|e| HarnessError::config(format!("invalid experiment file: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Range checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.data.num_classes == 0 {
            return Err(HarnessError::config("data.num_classes must be at least 1"));
        }
        if self.data.features_selected.is_empty() {
            return Err(HarnessError::config("data.features_selected must not be empty"));
        }
        if !matches!(self.arch.input_model_dim, 1 | 2) {
            return Err(HarnessError::config(format!(
                "arch.input_model_dim must be 1 or 2, got {}",
                self.arch.input_model_dim
            )));
        }
        if !matches!(self.arch.output_model_dim, 1 | 2) {
            return Err(HarnessError::config(format!(
                "arch.output_model_dim must be 1 or 2, got {}",
                self.arch.output_model_dim
            )));
        }
        if self.arch.input_model_dim == 1 && self.arch.output_model_dim == 2 {
            return Err(HarnessError::config(
                "1D inputs only support image-level outputs (output_model_dim = 1)",
            ));
        }
        let imp = &self.implementation;
        if imp.trainer.batch_size == 0 {
            return Err(HarnessError::config("implementation.trainer.batch_size must be > 0"));
        }
        if !(imp.optimizer.lr > 0.0) {
            return Err(HarnessError::config("implementation.optimizer.lr must be > 0"));
        }
        if imp.optimizer.weight_decay < 0.0 {
            return Err(HarnessError::config("implementation.optimizer.weight_decay must be >= 0"));
        }
        let split = &self.data.split;
        if split.train <= 0.0 || split.val < 0.0 || split.train + split.val > 1.0 {
            return Err(HarnessError::config(
                "data.split fractions must be positive and sum to at most 1",
            ));
        }
        Ok(())
    }

    pub fn resolved_classes(&self) -> Result<ResolvedClasses> {
        ResolvedClasses::from_raw(self.data.num_classes)
    }

    /// Input channels = one per selected feature.
    pub fn in_channels(&self) -> usize {
        self.data.features_selected.len()
    }

    /// True when the model emits one prediction per sample.
    pub fn image_level_output(&self) -> bool {
        self.arch.output_model_dim == 1
    }
}

// ─── ParamReader ──────────────────────────────────────────────────────────────
/// Typed access to a `Params` map. `owner` names the section in
/// error messages, e.g. `arch.args`.
pub struct ParamReader<'a> {
    params: &'a Params,
    owner:  &'a str,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a Params, owner: &'a str) -> Self {
        Self { params, owner }
    }

    fn wrong_type(&self, key: &str, expected: &str) -> HarnessError {
        HarnessError::config(format!("{}.{key} must be {expected}", self.owner))
    }

    pub fn usize(&self, key: &str) -> Result<Option<usize>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| self.wrong_type(key, "a non-negative integer")),
        }
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        Ok(self.usize(key)?.unwrap_or(default))
    }

    pub fn require_usize(&self, key: &str) -> Result<usize> {
        self.usize(key)?
            .ok_or_else(|| HarnessError::config(format!("missing required key {}.{key}", self.owner)))
    }

    pub fn usize_list_or(&self, key: &str, default: &[usize]) -> Result<Vec<usize>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default.to_vec()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_u64()
                        .map(|n| n as usize)
                        .ok_or_else(|| self.wrong_type(key, "a list of non-negative integers"))
                })
                .collect(),
            Some(_) => Err(self.wrong_type(key, "a list of non-negative integers")),
        }
    }

    pub fn f32_list(&self, key: &str) -> Result<Option<Vec<f32>>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|n| n as f32)
                        .ok_or_else(|| self.wrong_type(key, "a list of numbers"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(_) => Err(self.wrong_type(key, "a list of numbers")),
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.wrong_type(key, "a string")),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Keys not in `known`, for rejecting typos.
    pub fn unknown_keys(&self, known: &[&str]) -> Vec<String> {
        self.params
            .keys()
            .filter(|k| !known.contains(&k.as_str()))
            .cloned()
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SEGMENTATION_YAML: &str = r#"
task: Segmentation
save_path: runs/
data:
  num_classes: 3
  features_selected: [red, green, blue]
  height: 8
  width: 8
arch:
  user_defined: false
  type: Unet
  input_model_dim: 2
  output_model_dim: 2
  params:
    encoder_depth: 2
    base_channels: 4
implementation:
  loss:
    type: CrossEntropyLoss
    params: {}
    masked: false
  metrics: [accuracy, iou]
  optimizer:
    lr: 0.001
    weight_decay: 0.0
  trainer:
    batch_size: 4
    epochs: 1
    monitor:
      metric: iou
"#;

    pub(crate) fn segmentation_config() -> ExperimentConfig {
        ExperimentConfig::from_yaml_str(SEGMENTATION_YAML).unwrap()
    }

    #[test]
    fn test_parses_full_document() {
        let cfg = segmentation_config();
        assert_eq!(cfg.task, Task::Segmentation);
        assert_eq!(cfg.in_channels(), 3);
        assert_eq!(cfg.arch.kind, "Unet");
        assert_eq!(cfg.implementation.trainer.monitor.metric, "iou");
        // Defaults fill the optional keys
        assert_eq!(cfg.implementation.trainer.seed, 42);
        assert_eq!(cfg.data.num_samples, 64);
    }

    #[test]
    fn test_binary_collapses_to_one_class() {
        assert_eq!(ResolvedClasses::from_raw(2).unwrap().get(), 1);
        assert_eq!(ResolvedClasses::from_raw(1).unwrap().get(), 1);
        assert_eq!(ResolvedClasses::from_raw(5).unwrap().get(), 5);
        assert!(ResolvedClasses::from_raw(0).is_err());
    }

    #[test]
    fn test_classification_with_two_classes_resolves_to_one() {
        let yaml = SEGMENTATION_YAML
            .replace("task: Segmentation", "task: Classification")
            .replace("num_classes: 3", "num_classes: 2");
        let cfg = ExperimentConfig::from_yaml_str(&yaml).unwrap();
        let classes = cfg.resolved_classes().unwrap();
        assert!(classes.is_binary());
    }

    #[test]
    fn test_missing_required_key_is_configuration_error() {
        let yaml = SEGMENTATION_YAML.replace("    batch_size: 4\n", "");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
        assert!(err.is_fatal_at_setup());
    }

    #[test]
    fn test_rejects_bad_dims() {
        let yaml = SEGMENTATION_YAML.replace("input_model_dim: 2", "input_model_dim: 3");
        assert!(ExperimentConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_unknown_task_is_kept() {
        let yaml = SEGMENTATION_YAML.replace("task: Segmentation", "task: Regression");
        let cfg = ExperimentConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(cfg.task, Task::Other("Regression".to_string()));
        assert!(!cfg.task.is_class_labelled());
    }

    #[test]
    fn test_yaml_round_trip_keeps_selector() {
        let cfg  = segmentation_config();
        let text = cfg.to_yaml_string().unwrap();
        let back = ExperimentConfig::from_yaml_str(&text).unwrap();
        assert_eq!(back.arch.kind, cfg.arch.kind);
        assert_eq!(back.task, cfg.task);
    }

    #[test]
    fn test_param_reader_types() {
        let cfg    = segmentation_config();
        let reader = ParamReader::new(&cfg.arch.params, "arch.params");
        assert_eq!(reader.usize_or("encoder_depth", 9).unwrap(), 2);
        assert_eq!(reader.usize_or("missing", 9).unwrap(), 9);
        assert!(reader.require_usize("missing").is_err());

        let mut params = Params::new();
        params.insert("weight".into(), serde_json::json!([1, 0.5]));
        params.insert("name".into(), serde_json::json!(3));
        let reader = ParamReader::new(&params, "loss.params");
        assert_eq!(reader.f32_list("weight").unwrap(), Some(vec![1.0, 0.5]));
        assert!(reader.str_or("name", "x").is_err());
        assert_eq!(reader.unknown_keys(&["weight"]), vec!["name".to_string()]);
    }
}
