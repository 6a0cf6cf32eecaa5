// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
//   1. `train` — runs one experiment from a YAML config
//   2. `check` — resolves a config and prints a summary
//
// Backend choice lives here: Autodiff<Wgpu> by default,
// Autodiff<NdArray> with --cpu.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{Autodiff, NdArray, Wgpu};
use clap::Parser;
use commands::{CheckArgs, Commands, TrainArgs};

use crate::application::{
    check_use_case::CheckUseCase,
    train_use_case::{TrainReport, TrainUseCase},
};

type GpuBackend = Autodiff<Wgpu>;
type CpuBackend = Autodiff<NdArray<f32>>;

#[derive(Parser, Debug)]
#[command(
    name = "segharness",
    version = "0.1.0",
    about = "Config-driven training harness for 1D/2D classification and segmentation models."
)]
pub struct Cli {
    /// The subcommand to run (train or check)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the use case.
    pub fn run(self) -> Result<()> {
        match &self.command {
            Commands::Train(args) => run_train(args),
            Commands::Check(args) => run_check(args),
        }
    }
}

fn run_train(args: &TrainArgs) -> Result<()> {
    tracing::info!("Starting experiment from '{}'", args.config.display());
    let use_case = TrainUseCase::new(args.into());

    let report: TrainReport = if args.cpu {
        use_case.execute::<CpuBackend>(&Default::default())?
    } else {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        use_case.execute::<GpuBackend>(&device)?
    };

    println!(
        "Training complete: {} steps on {}/{}/{} train/val/test samples. Results in '{}'.",
        report.global_step,
        report.train_samples,
        report.val_samples,
        report.test_samples,
        report.experiment_dir.display()
    );
    Ok(())
}

fn run_check(args: &CheckArgs) -> Result<()> {
    let report = CheckUseCase::new(&args.config).execute::<NdArray<f32>>(&Default::default())?;
    println!("{report}");
    println!("Config OK.");
    Ok(())
}
