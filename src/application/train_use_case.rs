// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Seed backend and host RNG     (Layer 6 - infra)
//   Step 2: Load labelled samples         (Layer 4 - data)
//   Step 3: Split train/validation        (Layer 4 - data)
//   Step 4: Build datasets                (Layer 4 - data)
//   Step 5: Save hparams                  (Layer 6 - infra)
//   Step 6: Run training loop             (Layer 5 - ml)

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

use crate::data::{dataset::QaLabelDataset, loader::JsonlLoader, splitter::split_train_val};
use crate::domain::loss_weights::LossWeights;
use crate::infra::{
    checkpoint::{CheckpointManager, RetentionPolicy},
    metrics::MetricsLogger,
    seed::seed_everything,
};
use crate::ml::{
    labeler::LabelerHparams,
    model::QaEncoderConfig,
    trainer::{run_training, TrainBackend},
};

// ─── Batch limit ──────────────────────────────────────────────────────────────
/// How many training batches to run per epoch:
/// a fraction of the loader (`0.25`) or an absolute count (`40`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchLimit {
    Count(usize),
    Fraction(f64),
}

impl BatchLimit {
    /// Number of batches to take out of `total`
    pub fn resolve(&self, total: usize) -> usize {
        match *self {
            BatchLimit::Count(n) => n.min(total),
            BatchLimit::Fraction(f) => {
                let n = (total as f64 * f).floor() as usize;
                // A positive fraction always runs at least one batch
                if f > 0.0 && total > 0 { n.max(1) } else { n }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if let BatchLimit::Fraction(f) = *self {
            ensure!((0.0..=1.0).contains(&f), "limit_train_batches fraction must be in [0, 1], got {f}");
        }
        Ok(())
    }
}

impl Default for BatchLimit {
    fn default() -> Self {
        BatchLimit::Fraction(1.0)
    }
}

impl FromStr for BatchLimit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let limit = if s.contains('.') {
            BatchLimit::Fraction(s.parse().with_context(|| format!("invalid batch fraction '{s}'"))?)
        } else {
            BatchLimit::Count(s.parse().with_context(|| format!("invalid batch count '{s}'"))?)
        };
        limit.validate()?;
        Ok(limit)
    }
}

impl fmt::Display for BatchLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchLimit::Count(n)    => write!(f, "{n} batches"),
            BatchLimit::Fraction(x) => write!(f, "{:.0}% of batches", x * 100.0),
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a training run. Saved next to the checkpoints
// as hparams.json so inference can rebuild the same encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_file:          String,
    /// When absent, `train_fraction` of train_file is used for training
    pub val_file:            Option<String>,
    pub checkpoint_dir:      String,
    pub train_fraction:      f64,
    pub seed:                u64,
    pub epochs:              usize,
    pub batch_size:          usize,
    pub num_workers:         usize,
    pub limit_train_batches: BatchLimit,
    pub lr:                  f64,
    pub loss_weights:        LossWeights,
    pub freeze:              bool,
    pub save_top_k:          i64,
    pub every_n_epochs:      usize,
    pub vocab_size:          usize,
    pub max_seq_len:         usize,
    pub d_model:             usize,
    pub num_heads:           usize,
    pub num_layers:          usize,
    pub d_ff:                usize,
    pub dropout:             f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_file:          "data/train.jsonl".to_string(),
            val_file:            None,
            checkpoint_dir:      "checkpoints".to_string(),
            train_fraction:      0.8,
            seed:                42,
            epochs:              5,
            batch_size:          8,
            num_workers:         1,
            limit_train_batches: BatchLimit::default(),
            lr:                  2e-5,
            loss_weights:        LossWeights::default(),
            freeze:              false,
            save_top_k:          1,
            every_n_epochs:      1,
            vocab_size:          30522,
            max_seq_len:         512,
            d_model:             256,
            num_heads:           8,
            num_layers:          6,
            d_ff:                1024,
            dropout:             0.1,
        }
    }
}

impl TrainConfig {
    /// Load a full configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.lr.is_finite() && self.lr > 0.0, "lr must be positive, got {}", self.lr);
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.epochs > 0, "epochs must be at least 1");
        ensure!(
            self.train_fraction > 0.0 && self.train_fraction < 1.0 || self.val_file.is_some(),
            "train_fraction must be in (0, 1) when no val_file is given"
        );
        ensure!(self.save_top_k >= -1, "save_top_k must be -1, 0 or positive");
        ensure!(self.every_n_epochs > 0, "every_n_epochs must be at least 1");
        ensure!(self.num_heads > 0, "num_heads must be at least 1");
        if self.d_model % self.num_heads != 0 {
            bail!("d_model ({}) must be divisible by num_heads ({})", self.d_model, self.num_heads);
        }
        self.limit_train_batches.validate()
    }

    pub fn encoder_config(&self) -> QaEncoderConfig {
        QaEncoderConfig::new(
            self.vocab_size, self.max_seq_len, self.d_model,
            self.num_heads, self.num_layers, self.d_ff, self.dropout,
        )
    }

    pub fn labeler_hparams(&self) -> LabelerHparams {
        LabelerHparams {
            lr:           self.lr,
            loss_weights: self.loss_weights,
            freeze:       self.freeze,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy { save_top_k: self.save_top_k, every_n_epochs: self.every_n_epochs }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Seed everything before anything random happens ────────────
        let mut rng = seed_everything::<TrainBackend>(cfg.seed);
        tracing::info!(
            "Loss weights: question={}, answer={}",
            cfg.loss_weights.question(),
            cfg.loss_weights.answer()
        );

        // ── Step 2: Load labelled samples ─────────────────────────────────────
        let samples = JsonlLoader::new(&cfg.train_file).load_labelled()?;

        // ── Step 3: Train / validation split ──────────────────────────────────
        let (train_samples, val_samples) = match &cfg.val_file {
            Some(val_file) => (samples, JsonlLoader::new(val_file).load_labelled()?),
            None => split_train_val(samples, cfg.train_fraction, &mut rng),
        };
        ensure!(!train_samples.is_empty(), "no training samples in '{}'", cfg.train_file);
        ensure!(!val_samples.is_empty(), "validation set is empty; val_loss cannot be monitored");
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 4: Build Burn datasets ───────────────────────────────────────
        let train_dataset = QaLabelDataset::new(train_samples);
        let val_dataset   = QaLabelDataset::new(val_samples);

        // ── Step 5: Save hparams for inference ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir, cfg.retention())?;
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 6: Run training loop (Layer 5) ───────────────────────────────
        let summary = run_training(cfg, train_dataset, val_dataset, ckpt_manager, metrics, &mut rng)?;
        tracing::info!(
            "Best epoch {} with val_loss={:.4}, val_rho={:.4}",
            summary.best_epoch,
            summary.best_val_loss,
            summary.best_val_rho
        );

        Ok(())
    }
}
