// ============================================================
// Layer 6 — Run Logger
// ============================================================
// The LogSink the CLI wires in. For every scalar:
//
//   on_step   → tracing::debug! right away
//   on_epoch  → folded into a batch-size weighted mean, flushed
//               when the mode's epoch ends
//   prog_bar  → printed on the epoch progress line
//
// Output files (in the experiment folder):
//   metrics.csv   epoch,mode,key,value        epoch-level scalars
//   scalars.csv   step,tag,key,value          grouped scalars
//
// Example metrics.csv:
//   epoch,mode,key,value
//   1,train,train_loss,1.093215
//   1,train,train_iou,0.341002
//   1,val,val_loss,1.071188
//
// Writing is best effort: a failed write is reported through
// tracing and never interrupts training.
//
// MemorySink records every call, for tests.

use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::domain::error::Result;
use crate::domain::mode::Mode;
use crate::domain::traits::{LogSink, ScalarEntry};

const METRICS_HEADER: &str = "epoch,mode,key,value";
const SCALARS_HEADER: &str = "step,tag,key,value";

/// Running weighted mean of one key.
#[derive(Debug, Clone, Default)]
struct Pending {
    sum:      f64,
    weight:   f64,
    prog_bar: bool,
}

impl Pending {
    fn mean(&self) -> f64 {
        if self.weight > 0.0 { self.sum / self.weight } else { f64::NAN }
    }
}

pub struct RunLogger {
    metrics_csv: PathBuf,
    scalars_csv: PathBuf,
    pending:     HashMap<Mode, BTreeMap<String, Pending>>,
    epochs:      HashMap<Mode, usize>,
}

impl RunLogger {
    /// Create the CSV files in `dir`, writing headers for new ones.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let metrics_csv = dir.join("metrics.csv");
        let scalars_csv = dir.join("scalars.csv");
        for (path, header) in [(&metrics_csv, METRICS_HEADER), (&scalars_csv, SCALARS_HEADER)] {
            if !path.exists() {
                let mut f = fs::File::create(path)?;
                writeln!(f, "{header}")?;
            }
        }
        tracing::debug!("Run logger writing to '{}'", dir.display());

        Ok(Self { metrics_csv, scalars_csv, pending: HashMap::new(), epochs: HashMap::new() })
    }

    pub fn metrics_csv(&self) -> &Path {
        &self.metrics_csv
    }

    pub fn scalars_csv(&self) -> &Path {
        &self.scalars_csv
    }

    fn append(path: &Path, rows: &[String]) {
        let written = OpenOptions::new().append(true).open(path).and_then(|mut f| {
            for row in rows {
                writeln!(f, "{row}")?;
            }
            Ok(())
        });
        if let Err(e) = written {
            tracing::warn!("Cannot append to '{}': {}", path.display(), e);
        }
    }
}

impl LogSink for RunLogger {
    fn log(&mut self, entry: ScalarEntry) {
        if entry.on_step {
            tracing::debug!("{} = {:.6}", entry.key, entry.value);
        }
        if entry.on_epoch {
            let weight  = entry.batch_size.unwrap_or(1) as f64;
            let pending = self
                .pending
                .entry(entry.mode)
                .or_default()
                .entry(entry.key)
                .or_default();
            pending.sum      += entry.value * weight;
            pending.weight   += weight;
            pending.prog_bar |= entry.prog_bar;
        }
    }

    fn log_group(&mut self, tag: &str, values: &[(String, f64)], step: usize) {
        let rows: Vec<String> = values
            .iter()
            .map(|(key, value)| format!("{step},{tag},{key},{value:.6}"))
            .collect();
        let summary: Vec<String> = values.iter().map(|(k, v)| format!("{k}={v:.4}")).collect();
        tracing::info!("[{tag}] step {step}: {}", summary.join(" "));
        Self::append(&self.scalars_csv, &rows);
    }

    fn end_epoch(&mut self, mode: Mode) {
        let epoch = {
            let counter = self.epochs.entry(mode).or_insert(0);
            *counter += 1;
            *counter
        };
        let Some(values) = self.pending.remove(&mode) else {
            return;
        };

        let mut rows     = Vec::with_capacity(values.len());
        let mut progress = Vec::new();
        for (key, pending) in &values {
            let value = pending.mean();
            rows.push(format!("{epoch},{mode},{key},{value:.6}"));
            if pending.prog_bar {
                progress.push(format!("{key}={value:.4}"));
            }
        }
        Self::append(&self.metrics_csv, &rows);

        if !progress.is_empty() {
            println!("Epoch {:>3} [{:<5}] | {}", epoch, mode, progress.join(" | "));
        }
        tracing::info!("{} epoch {} closed ({} scalars)", mode, epoch, values.len());
    }
}

// ─── MemorySink ───────────────────────────────────────────────────────────────
/// One `log_group` call.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedGroup {
    pub tag:    String,
    pub values: Vec<(String, f64)>,
    pub step:   usize,
}

#[derive(Debug, Default)]
struct MemoryRecord {
    entries: Vec<ScalarEntry>,
    groups:  Vec<LoggedGroup>,
    closed:  Vec<Mode>,
}

/// Records every call. Clones share the same record, so a test
/// can hand one clone to the harness and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    record: Arc<Mutex<MemoryRecord>>,
}

impl MemorySink {
    fn lock(&self) -> MutexGuard<'_, MemoryRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entries(&self) -> Vec<ScalarEntry> {
        self.lock().entries.clone()
    }

    pub fn entries_for(&self, key: &str) -> Vec<ScalarEntry> {
        self.lock().entries.iter().filter(|e| e.key == key).cloned().collect()
    }

    pub fn groups(&self) -> Vec<LoggedGroup> {
        self.lock().groups.clone()
    }

    /// Modes in the order their epochs were closed.
    pub fn closed_epochs(&self) -> Vec<Mode> {
        self.lock().closed.clone()
    }
}

impl LogSink for MemorySink {
    fn log(&mut self, entry: ScalarEntry) {
        self.lock().entries.push(entry);
    }

    fn log_group(&mut self, tag: &str, values: &[(String, f64)], step: usize) {
        self.lock().groups.push(LoggedGroup { tag: tag.to_string(), values: values.to_vec(), step });
    }

    fn end_epoch(&mut self, mode: Mode) {
        self.lock().closed.push(mode);
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_mean_is_batch_weighted() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = RunLogger::new(tmp.path()).unwrap();

        log.log(ScalarEntry::step(Mode::Train, "loss", 1.0, 3));
        log.log(ScalarEntry::step(Mode::Train, "loss", 3.0, 1));
        log.log(ScalarEntry::step(Mode::Val, "loss", 9.0, 2));
        log.end_epoch(Mode::Train);

        let csv = fs::read_to_string(log.metrics_csv()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec![METRICS_HEADER, "1,train,train_loss,1.500000"]);

        log.end_epoch(Mode::Val);
        log.end_epoch(Mode::Train);
        let csv = fs::read_to_string(log.metrics_csv()).unwrap();
        assert_eq!(csv.lines().nth(2), Some("1,val,val_loss,9.000000"));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_groups_go_to_scalars_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = RunLogger::new(tmp.path()).unwrap();
        log.log_group("train_val_losses", &[("train_loss".into(), 0.5), ("val_loss".into(), 0.25)], 7);

        let csv = fs::read_to_string(log.scalars_csv()).unwrap();
        assert_eq!(
            csv.lines().collect::<Vec<_>>(),
            vec![SCALARS_HEADER, "7,train_val_losses,train_loss,0.500000", "7,train_val_losses,val_loss,0.250000"]
        );
    }

    #[test]
    fn test_memory_sink_clones_share_record() {
        let sink = MemorySink::default();
        let mut handle = sink.clone();
        handle.log(ScalarEntry::epoch(Mode::Test, "f1", 0.5));
        handle.end_epoch(Mode::Test);
        assert_eq!(sink.entries_for("test_f1").len(), 1);
        assert_eq!(sink.closed_epochs(), vec![Mode::Test]);
    }
}
