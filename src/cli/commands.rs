// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `check`, and their
// flags. clap's derive macros generate --help, error messages
// and type conversion.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainRequest;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one experiment: fit, validate each epoch, then test
    Train(TrainArgs),

    /// Resolve a config (model, loss, metrics) without training
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Experiment YAML file
    #[arg(long, default_value = "configs/config.yaml")]
    pub config: PathBuf,

    /// Experiment folder name under save_path (default: timestamp)
    #[arg(long = "exp-id", alias = "exp_id")]
    pub exp_id: Option<String>,

    /// Run on the CPU (NdArray) instead of the GPU (Wgpu)
    #[arg(long)]
    pub cpu: bool,
}

/// The application layer never sees clap types.
impl From<&TrainArgs> for TrainRequest {
    fn from(a: &TrainArgs) -> Self {
        TrainRequest { config_path: a.config.clone(), experiment_id: a.exp_id.clone() }
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Experiment YAML file
    #[arg(long, default_value = "configs/config.yaml")]
    pub config: PathBuf,
}
