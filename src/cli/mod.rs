// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// The job launcher. It parses arguments with `clap` and hands
// everything else to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`   — trains, evaluates and exports a classifier
//   2. `predict` — answers a JSON request with the latest export
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "mnist-classifier",
    version = "0.1.0",
    about = "Train linear, dnn, dnn_dropout or cnn MNIST classifiers, then serve the latest export."
)]
pub struct Cli {
    /// The subcommand to run (train or predict)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = args.into_job_config()?;
    tracing::info!(
        "Starting {} job: {} steps, output in '{}'",
        config.hparams.model, config.hparams.train_steps, config.output_dir.display(),
    );

    let report = TrainUseCase::new(config).execute()?;

    match &report.final_eval {
        Some(eval) => println!(
            "Training complete at step {} | loss={:.4} | accuracy={:.1}%",
            report.state.global_step, eval.loss, eval.accuracy * 100.0,
        ),
        None => println!("Training already complete at step {}", report.state.global_step),
    }
    if let Some(export) = &report.latest_export {
        println!("Latest export: {}", export.display());
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case    = PredictUseCase::new(args.export_dir)?;
    let predictions = use_case.predict_file(&args.input)?;
    println!("{}", serde_json::to_string_pretty(&predictions)?);
    Ok(())
}
