// ============================================================
// Layer 5 — ML Layer (Burn)
// ============================================================
// Everything that touches models, losses and metrics.
//
//   zoo/         built-in architectures and the Network wrapper
//   resolver.rs  arch section → ResolvedModel (model + final
//                activation), through explicit registries
//   loss.rs      loss section → unreduced per-element loss
//   metrics.rs   accumulators, one independent set per mode
//   step.rs      the shared step and masked loss reduction
//   epoch.rs     epoch-end metric flush and paired losses
//   module.rs    HarnessModule: setup, steps, optimizer
//   trainer.rs   DataLoader-driven fit / test loop
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Built-in 1D and 2D architectures
pub mod zoo;

/// Model registries and final activation policy
pub mod resolver;

/// Per-element loss functions
pub mod loss;

/// Metric accumulators and per-mode metric sets
pub mod metrics;

/// Shared train / val / test step
pub mod step;

/// Epoch-end aggregation
pub mod epoch;

/// Experiment module tying model, loss and metrics together
pub mod module;

/// Epoch loop over Burn DataLoaders
pub mod trainer;
