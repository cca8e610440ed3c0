// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records epoch-level metrics to a CSV file.
//
// Metrics recorded per epoch:
//   - epoch:      the epoch number (1, 2, 3, ...)
//   - train_loss: mean segmented training loss
//   - val_loss:   mean unweighted BCE on the validation set
//   - val_rho:    mean column Spearman correlation on validation
//
// Output file: <checkpoint_dir>/metrics.csv
//
//   epoch,train_loss,val_loss,val_rho
//   1,0.684210,0.671002,0.183400
//   2,0.652913,0.660145,0.241877
//
// Per-step values are folded into epoch values by
// MeanAccumulator, weighting each step by its batch size.
//
// Each training session starts a fresh file, matching the
// checkpoint index kept in the same directory.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    pub train_loss: f64,

    /// The monitored value for checkpointing (lower is better)
    pub val_loss: f64,

    /// Range: [-1.0, 1.0]
    pub val_rho: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, val_loss: f64, val_rho: f64) -> Self {
        Self { epoch, train_loss, val_loss, val_rho }
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// Batch-size weighted running mean of a per-step scalar
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAccumulator {
    sum:   f64,
    count: usize,
}

impl MeanAccumulator {
    pub fn add(&mut self, value: f64, weight: usize) {
        self.sum   += value * weight as f64;
        self.count += weight;
    }

    /// NaN when nothing was recorded
    pub fn mean(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.sum / self.count as f64 }
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Truncates any earlier session's file and writes the header.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "epoch,train_loss,val_loss,val_rho")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6}",
            m.epoch,
            m.train_loss,
            m.val_loss,
            m.val_rho,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}, val_rho={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
            m.val_rho,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 0.5, 0.45, 0.2);
        assert!(m.is_improvement(0.5));
        assert!(!m.is_improvement(0.4));
    }

    #[test]
    fn test_mean_is_weighted_by_batch_size() {
        let mut acc = MeanAccumulator::default();
        assert!(acc.mean().is_nan());
        acc.add(1.0, 3);
        acc.add(3.0, 1);
        assert_eq!(acc.mean(), 1.5);
    }

    #[test]
    fn test_csv_rows_append() {
        let dir = tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 0.7, 0.69, 0.1)).unwrap();
        logger.log(&EpochMetrics::new(2, 0.6, 0.65, 0.2)).unwrap();

        let text = std::fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,train_loss,val_loss,val_rho");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("2,0.600000"));
    }

    #[test]
    fn test_new_session_starts_fresh_file() {
        let dir = tempdir().unwrap();
        let first = MetricsLogger::new(dir.path()).unwrap();
        first.log(&EpochMetrics::new(1, 0.7, 0.69, 0.1)).unwrap();

        let second = MetricsLogger::new(dir.path()).unwrap();
        second.log(&EpochMetrics::new(1, 0.5, 0.55, 0.3)).unwrap();

        let text = std::fs::read_to_string(second.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["epoch,train_loss,val_loss,val_rho", "1,0.500000,0.550000,0.300000"]);
    }
}
