// ============================================================
// Layer 5 — Harness Module
// ============================================================
// Binds one resolved experiment together:
//
//   setup()               classes → model → loss → metrics
//                         (every selector checked here, before
//                          the first batch)
//   training_step()       shared step on the autodiff backend
//   validation_step()     shared step on a gradient-free snapshot
//   test_step()           idem, losses not kept
//   on_*_epoch_end()      metric flush, paired losses after val
//   configure_optimizer() Adam(lr, weight_decay), no scheduler
//   optimizer_step()      backward + update of the network
//
// The class count is resolved once in setup and reused by the
// model, the loss and every metric.

use burn::{
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::adapt::AdaptSpec;
use crate::data::batcher::Batch;
use crate::domain::config::{ExperimentConfig, ResolvedClasses};
use crate::domain::error::Result;
use crate::domain::mode::Mode;
use crate::domain::traits::LogSink;
use crate::ml::epoch::EpochAggregator;
use crate::ml::loss::{resolve_loss, LossFn};
use crate::ml::metrics::{build_metric_sets, MetricSets};
use crate::ml::resolver::{ModelRegistry, ResolvedModel};
use crate::ml::step::{shared_step, StepContext, StepOutput};
use crate::ml::zoo::Network;

/// Model and loss on the inner backend, for evaluation.
pub struct EvalSnapshot<B: Backend> {
    pub model: ResolvedModel<B>,
    pub loss:  LossFn<B>,
}

pub struct HarnessModule<B: AutodiffBackend> {
    pub config:  ExperimentConfig,
    pub classes: ResolvedClasses,
    pub model:   ResolvedModel<B>,
    pub loss:    LossFn<B>,
    pub adapt:   AdaptSpec,
    pub metrics: MetricSets,
    pub epoch:   EpochAggregator,
}

impl<B: AutodiffBackend> HarnessModule<B> {
    pub fn setup(config: ExperimentConfig, registry: &ModelRegistry<B>, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let classes = config.resolved_classes()?;
        let imp     = &config.implementation;

        let model   = registry.resolve(&config, classes, device)?;
        let loss    = resolve_loss(&imp.loss, classes, device)?;
        let metrics = build_metric_sets(&imp.metrics, classes)?;
        let epoch   = EpochAggregator::new(imp.trainer.monitor.metric.clone());
        let adapt   = AdaptSpec::from_config(&config);

        if !imp.metrics.contains(&imp.trainer.monitor.metric) {
            tracing::warn!(
                "Monitor metric '{}' is not among the configured metrics",
                imp.trainer.monitor.metric
            );
        }
        tracing::info!(
            "Harness ready: task={}, classes={}, loss={}, metrics=[{}]",
            config.task, classes, imp.loss.kind, imp.metrics.join(", ")
        );

        Ok(Self { config, classes, model, loss, adapt, metrics, epoch })
    }

    fn masked(&self) -> bool {
        self.config.implementation.loss.masked
    }

    pub fn training_step(&mut self, batch: Batch<B>, sink: &mut dyn LogSink) -> Result<StepOutput<B>> {
        let ctx = StepContext {
            model:   &self.model,
            loss:    &self.loss,
            adapt:   &self.adapt,
            masked:  self.masked(),
            classes: self.classes,
            class_labels: self.config.task.is_class_labelled(),
        };
        let out = shared_step(&ctx, batch, Mode::Train, self.metrics.get_mut(Mode::Train), sink)?;
        self.epoch.record_loss(Mode::Train, out.loss_value);
        Ok(out)
    }

    /// Gradient-free copy of the current weights.
    pub fn eval_snapshot(&self) -> EvalSnapshot<B::InnerBackend> {
        EvalSnapshot { model: self.model.valid(), loss: self.loss.valid() }
    }

    fn eval_step(
        &mut self,
        snapshot: &EvalSnapshot<B::InnerBackend>,
        batch:    Batch<B::InnerBackend>,
        mode:     Mode,
        sink:     &mut dyn LogSink,
    ) -> Result<StepOutput<B::InnerBackend>> {
        let ctx = StepContext {
            model:   &snapshot.model,
            loss:    &snapshot.loss,
            adapt:   &self.adapt,
            masked:  self.masked(),
            classes: self.classes,
            class_labels: self.config.task.is_class_labelled(),
        };
        let out = shared_step(&ctx, batch, mode, self.metrics.get_mut(mode), sink)?;
        self.epoch.record_loss(mode, out.loss_value);
        Ok(out)
    }

    pub fn validation_step(
        &mut self,
        snapshot: &EvalSnapshot<B::InnerBackend>,
        batch:    Batch<B::InnerBackend>,
        sink:     &mut dyn LogSink,
    ) -> Result<StepOutput<B::InnerBackend>> {
        self.eval_step(snapshot, batch, Mode::Val, sink)
    }

    pub fn test_step(
        &mut self,
        snapshot: &EvalSnapshot<B::InnerBackend>,
        batch:    Batch<B::InnerBackend>,
        sink:     &mut dyn LogSink,
    ) -> Result<StepOutput<B::InnerBackend>> {
        self.eval_step(snapshot, batch, Mode::Test, sink)
    }

    fn epoch_end(&mut self, mode: Mode, sink: &mut dyn LogSink, global_step: usize) {
        self.epoch.epoch_end(mode, self.metrics.get_mut(mode), sink, global_step);
    }

    pub fn on_train_epoch_end(&mut self, sink: &mut dyn LogSink, global_step: usize) {
        self.epoch_end(Mode::Train, sink, global_step);
    }

    pub fn on_validation_epoch_end(&mut self, sink: &mut dyn LogSink, global_step: usize) {
        self.epoch_end(Mode::Val, sink, global_step);
    }

    pub fn on_test_epoch_end(&mut self, sink: &mut dyn LogSink, global_step: usize) {
        self.epoch_end(Mode::Test, sink, global_step);
    }

    /// One Adam optimizer over every trainable parameter.
    pub fn configure_optimizer(&self) -> impl Optimizer<Network<B>, B> {
        let opt = &self.config.implementation.optimizer;
        let mut adam = AdamConfig::new();
        if opt.weight_decay > 0.0 {
            adam = adam.with_weight_decay(Some(WeightDecayConfig::new(opt.weight_decay as f32)));
        }
        adam.init::<B, Network<B>>()
    }

    /// Backpropagate `loss` and apply one update at the configured lr.
    pub fn optimizer_step<O: Optimizer<Network<B>, B>>(&mut self, optim: &mut O, loss: Tensor<B, 1>) {
        let grads   = GradientsParams::from_grads(loss.backward(), &self.model.network);
        let network = self.model.network.clone();
        self.model.network = optim.step(self.config.implementation.optimizer.lr, network, grads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::tests::segmentation_config;
    use crate::domain::error::HarnessError;
    use crate::infra::run_log::MemorySink;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn module() -> HarnessModule<TestBackend> {
        HarnessModule::setup(segmentation_config(), &ModelRegistry::with_builtins(), &Default::default()).unwrap()
    }

    fn batch<B: Backend>() -> Batch<B> {
        let device = Default::default();
        let x = Tensor::random([2, 3, 8, 8], burn::tensor::Distribution::Default, &device);
        Batch::new(x, Tensor::ones([2, 1, 8, 8], &device))
    }

    #[test]
    fn test_setup_fails_fast_on_unknown_metric() {
        let mut cfg = segmentation_config();
        cfg.implementation.metrics.push("auroc".into());
        let err = HarnessModule::<TestBackend>::setup(cfg, &ModelRegistry::with_builtins(), &Default::default())
            .err()
            .unwrap();
        assert!(err.is_fatal_at_setup());
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn test_training_step_updates_weights() {
        let mut m     = module();
        let mut sink  = MemorySink::default();
        let mut optim = m.configure_optimizer();

        let x      = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &Default::default());
        let before: Vec<f32> = m.model.forward(x.clone()).unwrap().into_data().to_vec().unwrap();

        let out = m.training_step(batch(), &mut sink).unwrap();
        m.optimizer_step(&mut optim, out.loss);

        let after: Vec<f32> = m.model.forward(x).unwrap().into_data().to_vec().unwrap();
        assert_ne!(before, after);
        assert_eq!(m.epoch.loss_train.len(), 1);
    }

    #[test]
    fn test_eval_steps_record_per_mode() {
        let mut m    = module();
        let mut sink = MemorySink::default();
        let snapshot = m.eval_snapshot();

        m.validation_step(&snapshot, batch(), &mut sink).unwrap();
        m.test_step(&snapshot, batch(), &mut sink).unwrap();
        assert_eq!(m.epoch.loss_val.len(), 1);
        assert!(m.epoch.loss_train.is_empty());

        m.on_validation_epoch_end(&mut sink, 0);
        m.on_test_epoch_end(&mut sink, 0);
        assert!(sink.groups().is_empty());
        let keys: Vec<String> = sink.entries().into_iter().map(|e| e.key).collect();
        assert!(keys.contains(&"val_iou".to_string()));
        assert!(keys.contains(&"test_accuracy".to_string()));
    }
}
