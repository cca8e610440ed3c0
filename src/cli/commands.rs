// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `predict`, and their
// flags.
//
// `train` starts from `--config <file.json>` when given, otherwise
// from TrainConfig::default(); every flag passed on the command
// line then overrides the matching field.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::application::train_use_case::{BatchLimit, TrainConfig};
use crate::domain::loss_weights::LossWeights;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the Q&A quality labeler on pre-tokenised JSONL
    Train(TrainArgs),

    /// Score a JSONL file with the best checkpoint
    Predict(PredictArgs),
}

/// All arguments for the `train` command.
/// Unset flags fall back to the config file or the defaults.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with a full TrainConfig
    #[arg(long)]
    pub config: Option<String>,

    /// Labelled samples, one JSON object per line
    #[arg(long)]
    pub train_file: Option<String>,

    /// Separate validation file; otherwise train_file is split
    #[arg(long)]
    pub val_file: Option<String>,

    /// Directory for checkpoints, hparams.json and metrics.csv
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    /// Share of train_file used for training when splitting
    #[arg(long)]
    pub train_fraction: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub num_workers: Option<usize>,

    /// Training batches per epoch: a fraction (0.25) or a count (40)
    #[arg(long)]
    pub limit_train_batches: Option<BatchLimit>,

    #[arg(long)]
    pub lr: Option<f64>,

    /// Segment loss weight, e.g. `--loss-weight question=1.0`.
    /// Both `question` and `answer` must be given.
    #[arg(long = "loss-weight", value_name = "KEY=VALUE")]
    pub loss_weights: Vec<String>,

    /// Keep statistics layers in eval mode while training
    #[arg(long)]
    pub freeze: bool,

    /// -1 keeps every checkpoint, 0 none, k the k best by val_loss
    #[arg(long, allow_hyphen_values = true)]
    pub save_top_k: Option<i64>,

    #[arg(long)]
    pub every_n_epochs: Option<usize>,

    #[arg(long)]
    pub vocab_size: Option<usize>,

    /// Longer inputs are truncated
    #[arg(long)]
    pub max_seq_len: Option<usize>,

    #[arg(long)]
    pub d_model: Option<usize>,

    /// d_model must be divisible by num_heads
    #[arg(long)]
    pub num_heads: Option<usize>,

    #[arg(long)]
    pub num_layers: Option<usize>,

    #[arg(long)]
    pub d_ff: Option<usize>,

    #[arg(long)]
    pub dropout: Option<f64>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let mut cfg = match &a.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };

        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $( if let Some(v) = a.$field { cfg.$field = v; } )*
            };
        }
        apply!(
            train_file, checkpoint_dir, train_fraction, seed, epochs,
            batch_size, num_workers, limit_train_batches, lr, save_top_k,
            every_n_epochs, vocab_size, max_seq_len, d_model, num_heads,
            num_layers, d_ff, dropout,
        );

        if a.val_file.is_some() {
            cfg.val_file = a.val_file;
        }
        if !a.loss_weights.is_empty() {
            cfg.loss_weights = LossWeights::parse_pairs(a.loss_weights.as_slice())?;
        }
        cfg.freeze |= a.freeze;

        cfg.validate()?;
        Ok(cfg)
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Pre-tokenised samples; labels, if present, are ignored
    #[arg(long)]
    pub input: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// CSV file to write
    #[arg(long, default_value = "predictions.csv")]
    pub output: String,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,
}
