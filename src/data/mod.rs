// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw samples to batches the step consumes:
//
//   SyntheticSource   → generates samples for the configured task
//       │                (stand-in for a real labelled corpus)
//       ▼
//   split_samples     → seeded train / val / test partition
//       │
//       ▼
//   SampleDataset     → implements Burn's Dataset trait
//       │
//       ▼
//   SampleBatcher     → stacks samples into rank-4 tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the epoch driver
//       │
//       ▼
//   adapt_variables   → per-batch shape normalisation, called by
//                        the shared step
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Task-specific shape normalisation of (x, masks, labels)
pub mod adapt;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Implements Burn's Dataset trait for samples
pub mod dataset;

/// Seeded train/val/test split
pub mod splitter;

/// Generates learnable samples from the experiment config
pub mod synthetic;
