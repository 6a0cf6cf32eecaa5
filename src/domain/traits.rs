// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The logging sink is the harness core's only side channel
// besides return values. The step function and the epoch
// aggregator talk to `dyn LogSink`; the application wires in
// a `RunLogger` (console + CSV) and tests wire in a
// `MemorySink` that records every call.

use crate::domain::mode::Mode;

// ─── ScalarEntry ──────────────────────────────────────────────────────────────
/// One logged scalar with its aggregation flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarEntry {
    /// Full key, e.g. `train_loss` or `val_accuracy`
    pub key: String,

    pub value: f64,

    /// Mode the value was produced in; routes epoch flushing
    pub mode: Mode,

    /// Emit this value immediately for the current step
    pub on_step: bool,

    /// Fold this value into the epoch-level aggregate
    pub on_epoch: bool,

    /// Show the epoch value on the progress line
    pub prog_bar: bool,

    /// Weight of this value in the epoch mean
    pub batch_size: Option<usize>,
}

impl ScalarEntry {
    /// A per-step value that is also averaged over the epoch.
    pub fn step(mode: Mode, name: &str, value: f64, batch_size: usize) -> Self {
        Self {
            key:        mode.key(name),
            value,
            mode,
            on_step:    true,
            on_epoch:   true,
            prog_bar:   false,
            batch_size: Some(batch_size),
        }
    }

    /// An epoch-level value, never emitted per step.
    pub fn epoch(mode: Mode, name: &str, value: f64) -> Self {
        Self {
            key:        mode.key(name),
            value,
            mode,
            on_step:    false,
            on_epoch:   true,
            prog_bar:   false,
            batch_size: None,
        }
    }

    pub fn with_prog_bar(mut self, prog_bar: bool) -> Self {
        self.prog_bar = prog_bar;
        self
    }
}

// ─── LogSink ──────────────────────────────────────────────────────────────────
/// Receives every scalar the harness produces.
///
/// Implementations:
///   - RunLogger  → tracing + progress line + CSV files
///   - MemorySink → in-memory record for tests
pub trait LogSink: Send {
    /// Record one scalar.
    fn log(&mut self, entry: ScalarEntry);

    /// Record a group of related scalars under one tag at the
    /// given global step (e.g. paired train/val losses).
    fn log_group(&mut self, tag: &str, values: &[(String, f64)], step: usize);

    /// Close the epoch for `mode`: aggregate and emit every
    /// pending `on_epoch` value of that mode.
    fn end_epoch(&mut self, mode: Mode);
}
