// ============================================================
// Layer 2 — CheckUseCase
// ============================================================
// Loads a config and resolves everything a run would resolve
// (model, final activation, loss, metrics) without touching
// data or the filesystem beyond the config file. Any selector
// problem surfaces here exactly as it would at training start.

use std::{fmt, path::PathBuf};

use anyhow::{Context, Result};
use burn::prelude::*;

use crate::domain::config::ResolvedClasses;
use crate::infra::experiment::load_config;
use crate::ml::{
    loss::resolve_loss,
    metrics::build_metric_sets,
    resolver::{FinalActivation, ModelRegistry},
};

/// Summary of a resolved config.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub task:       String,
    pub classes:    ResolvedClasses,
    pub model:      String,
    pub parameters: usize,
    pub activation: FinalActivation,
    pub loss:       String,
    pub masked:     bool,
    pub metrics:    Vec<String>,
    pub monitor:    String,
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "task        {}", self.task)?;
        writeln!(f, "classes     {}", self.classes)?;
        writeln!(f, "model       {} ({} parameters)", self.model, self.parameters)?;
        writeln!(f, "activation  {:?}", self.activation)?;
        writeln!(f, "loss        {}{}", self.loss, if self.masked { " (masked)" } else { "" })?;
        writeln!(f, "metrics     {}", self.metrics.join(", "))?;
        write!(f, "monitor     {}", self.monitor)
    }
}

pub struct CheckUseCase {
    config_path: PathBuf,
}

impl CheckUseCase {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<CheckReport> {
        let cfg = load_config(&self.config_path)
            .with_context(|| format!("Invalid config '{}'", self.config_path.display()))?;
        let classes = cfg.resolved_classes()?;
        let imp     = &cfg.implementation;

        let model = ModelRegistry::<B>::with_builtins().resolve(&cfg, classes, device)?;
        resolve_loss::<B>(&imp.loss, classes, device)?;
        let metrics = build_metric_sets(&imp.metrics, classes)?;

        Ok(CheckReport {
            task:       cfg.task.to_string(),
            classes,
            model:      model.network.kind().to_string(),
            parameters: model.num_params(),
            activation: model.activation,
            loss:       imp.loss.kind.clone(),
            masked:     imp.loss.masked,
            metrics:    metrics.train.names().iter().map(|n| n.to_string()).collect(),
            monitor:    imp.trainer.monitor.metric.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::tests::SEGMENTATION_YAML;
    use burn::backend::NdArray;

    #[test]
    fn test_check_reports_resolution() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cfg.yaml");
        std::fs::write(&path, SEGMENTATION_YAML).unwrap();

        let report = CheckUseCase::new(&path).execute::<NdArray<f32>>(&Default::default()).unwrap();
        assert_eq!(report.model, "Unet");
        assert_eq!(report.activation, FinalActivation::Softmax { dim: 1 });
        assert_eq!(report.metrics, vec!["accuracy", "iou"]);
        assert!(report.parameters > 0);
        assert!(report.to_string().contains("CrossEntropyLoss"));
    }

    #[test]
    fn test_check_fails_on_unknown_loss() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cfg.yaml");
        std::fs::write(&path, SEGMENTATION_YAML.replace("CrossEntropyLoss", "HingeLoss")).unwrap();
        assert!(CheckUseCase::new(&path).execute::<NdArray<f32>>(&Default::default()).is_err());
    }
}
