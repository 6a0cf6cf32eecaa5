// ============================================================
// Layer 3 — Error Types
// ============================================================
// Every failure the harness core can raise. Setup problems
// (bad selectors, unknown losses or metrics, missing keys) are
// Configuration errors and are fatal before training starts.
// A batch that lacks `x` or `labels`, or whose tensors do not
// line up, is a BatchFormat error and is reported per batch.
//
// The application and CLI layers wrap these in anyhow::Error.

use thiserror::Error;

/// Errors raised while resolving or running an experiment.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("batch format error: {0}")]
    BatchFormat(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("tensor readback failed: {0}")]
    Tensor(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn batch(msg: impl Into<String>) -> Self {
        Self::BatchFormat(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// True for errors that must abort the run at setup time.
    pub fn is_fatal_at_setup(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
