// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong to a business layer:
//
//   experiment.rs  — YAML config loading and the experiment
//                    folder (id, directories, config dump)
//   run_log.rs     — the LogSink used by the CLI: console
//                    progress line plus CSV files; MemorySink
//                    for tests
//   checkpoint.rs  — per-epoch network weights via Burn's
//                    CompactRecorder
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Experiment folder bootstrap and config I/O
pub mod experiment;

/// Console + CSV scalar logging
pub mod run_log;

/// Model checkpoint saving and loading
pub mod checkpoint;
