// ============================================================
// Layer 5 — Epoch Driver
// ============================================================
// Feeds batches to the HarnessModule using Burn's DataLoader.
//
// Per epoch:
//   train loader  (Autodiff backend)   training_step + Adam update
//   on_train_epoch_end
//   eval_snapshot()                    model.valid() → inner backend
//   val loader    (inner backend)      validation_step
//   on_validation_epoch_end            paired train/val losses
//
// `test` runs one pass over the test loader on the final weights.
// With a CheckpointManager attached, weights are saved after
// every epoch.
// A malformed batch aborts the run with its BatchFormat error.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use burn::{data::dataloader::DataLoaderBuilder, tensor::backend::AutodiffBackend};

use crate::data::{batcher::SampleBatcher, dataset::SampleDataset};
use crate::domain::config::TrainerSpec;
use crate::domain::error::Result;
use crate::domain::traits::LogSink;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::module::HarnessModule;

pub struct Trainer {
    pub epochs:      usize,
    pub batch_size:  usize,
    pub seed:        u64,
    /// Optimizer updates so far
    pub global_step: usize,
    checkpoints:     Option<CheckpointManager>,
}

impl Trainer {
    pub fn new(spec: &TrainerSpec) -> Self {
        Self { epochs: spec.epochs, batch_size: spec.batch_size, seed: spec.seed, global_step: 0, checkpoints: None }
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn fit<B: AutodiffBackend>(
        &mut self,
        module:   &mut HarnessModule<B>,
        train:    SampleDataset,
        val:      SampleDataset,
        device:   &B::Device,
        sink:     &mut dyn LogSink,
    ) -> Result<()> {
        tracing::info!(
            "Fitting for {} epoch(s): {} train / {} val samples, batch size {}",
            self.epochs, train.sample_count(), val.sample_count(), self.batch_size
        );

        // ── Training data loader (AutodiffBackend) ────────────────────────────
        let train_loader = DataLoaderBuilder::new(SampleBatcher::<B>::new(device.clone()))
            .batch_size(self.batch_size)
            .shuffle(self.seed)
            .num_workers(1)
            .build(train);

        // ── Validation data loader (InnerBackend, no autodiff overhead) ───────
        let val_loader = DataLoaderBuilder::new(SampleBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(self.batch_size)
            .num_workers(1)
            .build(val);

        let mut optim = module.configure_optimizer();

        for epoch in 1..=self.epochs {
            let mut batches = 0usize;
            for batch in train_loader.iter() {
                let out = module.training_step(batch, sink)?;
                module.optimizer_step(&mut optim, out.loss);
                self.global_step += 1;
                batches += 1;
            }
            tracing::debug!("Epoch {epoch}: {batches} training batches");
            module.on_train_epoch_end(sink, self.global_step);

            let snapshot = module.eval_snapshot();
            for batch in val_loader.iter() {
                module.validation_step(&snapshot, batch, sink)?;
            }
            module.on_validation_epoch_end(sink, self.global_step);

            if let Some(ckpt) = &self.checkpoints {
                ckpt.save_network(&module.model.network, epoch)?;
            }

            tracing::info!("Epoch {:>3}/{} done (step {})", epoch, self.epochs, self.global_step);
        }

        tracing::info!("Training complete!");
        Ok(())
    }

    pub fn test<B: AutodiffBackend>(
        &self,
        module: &mut HarnessModule<B>,
        test:   SampleDataset,
        device: &B::Device,
        sink:   &mut dyn LogSink,
    ) -> Result<()> {
        tracing::info!("Testing on {} samples", test.sample_count());
        let test_loader = DataLoaderBuilder::new(SampleBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(self.batch_size)
            .num_workers(1)
            .build(test);

        let snapshot = module.eval_snapshot();
        for batch in test_loader.iter() {
            module.test_step(&snapshot, batch, sink)?;
        }
        module.on_test_epoch_end(sink, self.global_step);
        Ok(())
    }
}
