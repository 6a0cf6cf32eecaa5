// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one experiment in order:
//
//   Step 1: Bootstrap experiment folder   (Layer 6 - infra)
//   Step 2: Generate samples              (Layer 4 - data)
//   Step 3: Split train/val/test          (Layer 4 - data)
//   Step 4: Build datasets                (Layer 4 - data)
//   Step 5: Resolve model, loss, metrics  (Layer 5 - ml)
//   Step 6: Fit                           (Layer 5 - ml)
//   Step 7: Test on the final weights     (Layer 5 - ml)
//
// Generic over the autodiff backend; the CLI picks Wgpu or
// NdArray.
//
// Reference: Burn Book §5 (Training)

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::data::{dataset::SampleDataset, splitter::split_samples, synthetic::SyntheticSource};
use crate::domain::traits::LogSink;
use crate::infra::{
    checkpoint::CheckpointManager,
    experiment::{bootstrap, Experiment},
    run_log::RunLogger,
};
use crate::ml::{module::HarnessModule, resolver::ModelRegistry, trainer::Trainer};

/// What the user asked for on the command line.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub config_path:   PathBuf,
    pub experiment_id: Option<String>,
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub experiment_dir: PathBuf,
    pub global_step:    usize,
    pub train_samples:  usize,
    pub val_samples:    usize,
    pub test_samples:   usize,
}

pub struct TrainUseCase {
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request }
    }

    /// Execute the full pipeline, logging to the experiment folder.
    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainReport> {
        // ── Step 1: Bootstrap experiment folder ───────────────────────────────
        let experiment = bootstrap(&self.request.config_path, self.request.experiment_id.clone())
            .with_context(|| format!("Cannot set up experiment from '{}'", self.request.config_path.display()))?;

        let mut sink = RunLogger::new(&experiment.dir)?;
        run_experiment::<B>(&experiment, &ModelRegistry::with_builtins(), device, &mut sink)
    }
}

/// Steps 2–7 for an already bootstrapped experiment.
pub fn run_experiment<B: AutodiffBackend>(
    experiment: &Experiment,
    registry:   &ModelRegistry<B>,
    device:     &B::Device,
    sink:       &mut dyn LogSink,
) -> Result<TrainReport> {
    let cfg = &experiment.config;

    // ── Step 2: Generate samples ──────────────────────────────────────────────
    let samples = SyntheticSource::from_config(cfg).generate();
    tracing::info!("Generated {} samples", samples.len());

    // ── Step 3: Train / validation / test split ───────────────────────────────
    let sets = split_samples(samples, &cfg.data.split, cfg.implementation.trainer.seed);
    let (train_samples, val_samples, test_samples) = (sets.train.len(), sets.val.len(), sets.test.len());
    tracing::info!("Split: {} train, {} val, {} test", train_samples, val_samples, test_samples);
    if train_samples == 0 {
        anyhow::bail!("No training samples: raise data.num_samples or data.split.train");
    }

    // ── Step 4: Build Burn datasets ───────────────────────────────────────────
    let train = SampleDataset::new(sets.train)?;
    let val   = SampleDataset::new(sets.val)?;
    let test  = SampleDataset::new(sets.test)?;

    // ── Step 5: Resolve model, loss, metrics (fails fast) ─────────────────────
    let mut module = HarnessModule::setup(cfg.clone(), registry, device)
        .context("Experiment setup failed")?;

    // ── Step 6: Fit ───────────────────────────────────────────────────────────
    let checkpoints = CheckpointManager::new(experiment.checkpoint_dir())?;
    let mut trainer = Trainer::new(&cfg.implementation.trainer).with_checkpoints(checkpoints);
    trainer.fit(&mut module, train, val, device, sink).context("Training failed")?;

    // ── Step 7: Test ──────────────────────────────────────────────────────────
    trainer.test(&mut module, test, device, sink).context("Testing failed")?;

    Ok(TrainReport {
        experiment_dir: experiment.dir.clone(),
        global_step:    trainer.global_step,
        train_samples,
        val_samples,
        test_samples,
    })
}
