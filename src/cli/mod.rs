// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// `clap` and delegates everything else to Layer 2.
//
// Two commands are supported:
//   1. `train`   — fits the labeler and keeps the best checkpoints
//   2. `predict` — scores a JSONL file into a CSV of probabilities

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "qa-labeler",
    version = "0.1.0",
    about = "Train a 30-label Q&A quality classifier, then score new Q&A pairs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case; no computation here
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = TrainConfig::try_from(args)?;
    tracing::info!("Starting training on: {}", config.train_file);

    TrainUseCase::new(config.clone()).execute()?;

    println!("Training complete. Checkpoints in '{}'.", config.checkpoint_dir);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.checkpoint_dir, args.batch_size)?;
    let rows = use_case.execute(&args.input, &args.output)?;

    println!("Wrote {} predictions to '{}'.", rows, args.output);
    Ok(())
}
