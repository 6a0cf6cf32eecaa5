// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain types shared by every other layer:
//
//   config.rs — the experiment configuration and its resolved
//               class count
//   mode.rs   — train / val / test
//   error.rs  — HarnessError (Configuration, BatchFormat, ...)
//   traits.rs — the LogSink abstraction
//
// No Burn types appear here.

pub mod config;
pub mod error;
pub mod mode;
pub mod traits;

pub use config::{ExperimentConfig, ResolvedClasses, Task};
pub use error::{HarnessError, Result};
pub use mode::Mode;
pub use traits::{LogSink, ScalarEntry};
