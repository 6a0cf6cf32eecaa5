// ============================================================
// Layer 5 — Epoch Aggregation
// ============================================================
// Log + reset a mode's metrics; after validation, pair the mean
// train and val losses under one tag.

use crate::domain::mode::Mode;
use crate::domain::traits::{LogSink, ScalarEntry};
use crate::ml::metrics::MetricSet;

pub const PAIRED_LOSS_TAG: &str = "train_val_losses";

#[derive(Debug, Clone, Default)]
pub struct EpochAggregator {
    pub monitor:    String,
    pub loss_train: Vec<f64>,
    pub loss_val:   Vec<f64>,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl EpochAggregator {
    pub fn new(monitor: impl Into<String>) -> Self {
        Self { monitor: monitor.into(), ..Default::default() }
    }

    /// Test losses are not kept.
    pub fn record_loss(&mut self, mode: Mode, value: f64) {
        match mode {
            Mode::Train => self.loss_train.push(value),
            Mode::Val   => self.loss_val.push(value),
            Mode::Test  => {}
        }
    }

    pub fn epoch_end(
        &mut self,
        mode:        Mode,
        metrics:     &mut MetricSet,
        sink:        &mut dyn LogSink,
        global_step: usize,
    ) {
        for (name, value) in metrics.compute() {
            let prog_bar = name == self.monitor;
            sink.log(ScalarEntry::epoch(mode, &name, value).with_prog_bar(prog_bar));
        }
        metrics.reset();

        if mode == Mode::Val && !self.loss_train.is_empty() {
            let mut values = vec![(Mode::Train.key("loss"), mean(&self.loss_train))];
            if !self.loss_val.is_empty() {
                values.push((Mode::Val.key("loss"), mean(&self.loss_val)));
            }
            sink.log_group(PAIRED_LOSS_TAG, &values, global_step);
            self.loss_train.clear();
            self.loss_val.clear();
        }

        sink.end_epoch(mode);
    }
}
