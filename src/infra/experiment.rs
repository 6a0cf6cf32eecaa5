// ============================================================
// Layer 6 — Experiment Bootstrap
// ============================================================
// Loads the YAML config and lays out the experiment folder:
//
//   <save_path>/
//     <experiment_id>/        ← default id: local timestamp
//       config.yaml           ← effective config of the run
//       metrics.csv           ← written by RunLogger
//       scalars.csv
//       checkpoints/
//
// After bootstrap `save_path` points at the experiment folder and
// `experiment_id` is filled in, so the dumped config.yaml
// describes the run exactly.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::config::ExperimentConfig;
use crate::domain::error::{HarnessError, Result};

pub const EXPERIMENT_ID_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A bootstrapped experiment.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub config: ExperimentConfig,
    pub dir:    PathBuf,
}

impl Experiment {
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.dir.join("checkpoints")
    }
}

pub fn default_experiment_id() -> String {
    chrono::Local::now().format(EXPERIMENT_ID_FORMAT).to_string()
}

/// Read and validate an experiment YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<ExperimentConfig> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|e| {
        HarnessError::config(format!("cannot read config '{}': {e}", path.display()))
    })?;
    ExperimentConfig::from_yaml_str(&yaml)
}

/// Load `config_path`, create the experiment folder and dump the
/// effective config into it.
pub fn bootstrap(config_path: impl AsRef<Path>, experiment_id: Option<String>) -> Result<Experiment> {
    let mut config = load_config(config_path)?;
    let id = experiment_id.unwrap_or_else(default_experiment_id);
    if id.is_empty() || id.contains(['/', '\\']) {
        return Err(HarnessError::config(format!("invalid experiment id '{id}'")));
    }

    let root = PathBuf::from(&config.save_path);
    fs::create_dir_all(&root)?;
    let dir = root.join(&id);
    fs::create_dir_all(&dir)?;

    config.experiment_id = Some(id);
    config.save_path     = dir.to_string_lossy().into_owned();
    fs::write(dir.join("config.yaml"), config.to_yaml_string()?)?;

    tracing::info!("Experiment folder: '{}'", dir.display());
    Ok(Experiment { config, dir })
}
