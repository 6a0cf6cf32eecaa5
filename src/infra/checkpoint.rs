// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores network weights using Burn's CompactRecorder.
//
// File naming convention:
//   <experiment>/checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz   ← weights after epoch 2
//     ...
//     latest_epoch.json      ← number of the latest epoch
//
// Loading needs a network of the same architecture; build it
// from the experiment's config.yaml and the model registry.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{fs, path::PathBuf};

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::domain::error::{HarnessError, Result};
use crate::ml::zoo::Network;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Write {dir}/model_epoch_{epoch}.mpk.gz and move the
    /// latest-epoch pointer.
    pub fn save_network<B: Backend>(&self, network: &Network<B>, epoch: usize) -> Result<()> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));
        CompactRecorder::new()
            .record(network.clone().into_record(), path.clone())
            .map_err(|e| HarnessError::Checkpoint(format!("cannot save '{}': {e}", path.display())))?;

        fs::write(self.dir.join("latest_epoch.json"), serde_json::to_string(&epoch)?)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Restore the latest weights into `network`.
    pub fn load_latest<B: Backend>(&self, network: Network<B>, device: &B::Device) -> Result<Network<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));
        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .map_err(|e| HarnessError::Checkpoint(format!("cannot load '{}': {e}", path.display())))?;
        Ok(network.load_record(record))
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");
        let s = fs::read_to_string(&path).map_err(|_| {
            HarnessError::Checkpoint(format!("no checkpoint pointer at '{}'", path.display()))
        })?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}
