// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores scorer weights using Burn's CompactRecorder
// and keeps only the best checkpoints by validation loss.
//
// What gets written:
//   1. Model weights (.mpk)      — one file per retained epoch
//   2. checkpoints.json          — retained epochs and their val_loss
//   3. hparams.json              — the full TrainConfig (lr, loss
//                                  weights, freeze flag, encoder dims)
//
// Retention policy, evaluated after each validation pass:
//   - only every `every_n_epochs`-th epoch is considered
//   - save_top_k = -1  keep every considered epoch
//   - save_top_k =  0  never save weights
//   - save_top_k =  k  keep the k lowest val_loss epochs; a new
//                      epoch replaces the current worst only if
//                      its val_loss is strictly lower
//
// The index belongs to one training session. Opening a directory
// for writing removes the records listed by the previous session
// and starts an empty index.
//
// File naming convention:
//   checkpoints/
//     model_epoch_3.mpk
//     model_epoch_7.mpk
//     checkpoints.json
//     hparams.json
//     metrics.csv

use anyhow::{Context, Result};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;

// CompactRecorder's file extension
const RECORD_EXTENSION: &str = "mpk";

/// One retained checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub epoch:    usize,
    pub val_loss: f64,
}

/// Which epochs to keep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub save_top_k:     i64,
    pub every_n_epochs: usize,
}

pub struct CheckpointManager {
    dir:     PathBuf,
    policy:  RetentionPolicy,
    entries: Vec<CheckpointEntry>,
}

impl CheckpointManager {
    /// Open `dir` for a new training session, creating it if needed.
    /// Records indexed by an earlier session are deleted.
    pub fn new(dir: impl Into<PathBuf>, policy: RetentionPolicy) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;

        let manager = Self { dir, policy, entries: Vec::new() };
        if manager.index_path().exists() {
            let stale = read_index(&manager.dir)?;
            for entry in &stale {
                manager.remove_record(entry.epoch)?;
            }
            if !stale.is_empty() {
                tracing::info!("Removed {} checkpoint(s) from a previous session", stale.len());
            }
        }
        manager.write_index()?;
        Ok(manager)
    }

    /// Open an existing directory for loading only
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let entries = read_index(&dir)?;
        let policy = RetentionPolicy { save_top_k: -1, every_n_epochs: 1 };
        Ok(Self { dir, policy, entries })
    }

    pub fn entries(&self) -> &[CheckpointEntry] {
        &self.entries
    }

    /// Retained checkpoint with the lowest val_loss
    pub fn best(&self) -> Option<&CheckpointEntry> {
        self.entries
            .iter()
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    }

    /// Apply the retention policy to a finished epoch.
    /// Returns true if weights were written.
    pub fn on_validation_end<B: Backend, M: Module<B>>(
        &mut self,
        model:    &M,
        epoch:    usize,
        val_loss: f64,
    ) -> Result<bool> {
        if !self.should_save(epoch, val_loss) {
            return Ok(false);
        }

        let path = self.model_path(epoch);
        <CompactRecorder as Recorder<B>>::record(&CompactRecorder::new(), model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        self.entries.push(CheckpointEntry { epoch, val_loss });

        if let Ok(k) = usize::try_from(self.policy.save_top_k) {
            while self.entries.len() > k {
                let evicted = self.remove_worst();
                self.remove_record(evicted.epoch)?;
                tracing::debug!("Dropped checkpoint for epoch {} (val_loss={:.4})", evicted.epoch, evicted.val_loss);
            }
        }

        self.write_index()?;
        tracing::info!("Saved checkpoint: epoch {} val_loss={:.4}", epoch, val_loss);
        Ok(true)
    }

    fn should_save(&self, epoch: usize, val_loss: f64) -> bool {
        if self.policy.every_n_epochs == 0 || epoch % self.policy.every_n_epochs != 0 {
            return false;
        }
        match self.policy.save_top_k {
            k if k < 0 => true,
            0 => false,
            k => {
                if self.entries.len() < k as usize {
                    return true;
                }
                // NaN never displaces a finite checkpoint
                self.worst().is_some_and(|w| val_loss < w.val_loss)
            }
        }
    }

    fn worst(&self) -> Option<&CheckpointEntry> {
        self.entries
            .iter()
            .max_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    }

    fn remove_worst(&mut self) -> CheckpointEntry {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.val_loss.total_cmp(&b.val_loss))
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.entries.remove(idx)
    }

    /// Load the lowest-val_loss weights into `model`
    pub fn load_best<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let best = self
            .best()
            .with_context(|| format!("No checkpoints recorded in '{}'. Have you trained the model first?", self.dir.display()))?;
        let path = self.model_path(best.epoch);

        tracing::info!("Loading checkpoint from epoch {} (val_loss={:.4})", best.epoch, best.val_loss);

        let record = <CompactRecorder as Recorder<B>>::load(&CompactRecorder::new(), path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    /// Save the training configuration so the model can be rebuilt.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("hparams.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("hparams.json");
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'predict'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    /// Path without extension; the recorder appends it
    fn model_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("model_epoch_{epoch}"))
    }

    fn record_file(&self, epoch: usize) -> PathBuf {
        self.model_path(epoch).with_extension(RECORD_EXTENSION)
    }

    /// Delete one epoch's weights; an already missing file is fine
    fn remove_record(&self, epoch: usize) -> Result<()> {
        let file = self.record_file(epoch);
        match fs::remove_file(&file) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Cannot remove checkpoint '{}'", file.display()))
            }
            _ => Ok(()),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("checkpoints.json")
    }

    fn write_index(&self) -> Result<()> {
        let path = self.index_path();
        fs::write(&path, serde_json::to_string_pretty(&self.entries)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))
    }
}

fn read_index(dir: &Path) -> Result<Vec<CheckpointEntry>> {
    let path = dir.join("checkpoints.json");
    let s = fs::read_to_string(&path)
        .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
    serde_json::from_str(&s)
        .with_context(|| format!("Malformed checkpoint index '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stats_mode::StatsMode;
    use crate::ml::{model::QaEncoderConfig, scorer::LabelScorer};
    use burn::backend::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn encoder_cfg() -> QaEncoderConfig {
        QaEncoderConfig::new(16, 8, 8, 2, 1, 16, 0.0)
    }

    fn epochs(m: &CheckpointManager) -> Vec<usize> {
        let mut e: Vec<usize> = m.entries().iter().map(|e| e.epoch).collect();
        e.sort_unstable();
        e
    }

    #[test]
    fn test_keeps_top_k_by_val_loss() {
        let dir = tempdir().unwrap();
        let model = encoder_cfg().init::<TestBackend>(&Default::default());
        let mut mgr = CheckpointManager::new(dir.path(), RetentionPolicy { save_top_k: 2, every_n_epochs: 1 }).unwrap();

        assert!(mgr.on_validation_end::<TestBackend, _>(&model, 1, 0.70).unwrap());
        assert!(mgr.on_validation_end::<TestBackend, _>(&model, 2, 0.60).unwrap());
        assert!(!mgr.on_validation_end::<TestBackend, _>(&model, 3, 0.75).unwrap());
        assert!(mgr.on_validation_end::<TestBackend, _>(&model, 4, 0.50).unwrap());

        assert_eq!(epochs(&mgr), vec![2, 4]);
        assert_eq!(mgr.best().unwrap().epoch, 4);
        let mut on_disk: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("model_epoch_"))
            .collect();
        on_disk.sort();
        assert_eq!(on_disk, vec!["model_epoch_2.mpk", "model_epoch_4.mpk"]);

        // Index survives a reopen
        let reopened = CheckpointManager::open(dir.path()).unwrap();
        assert_eq!(epochs(&reopened), vec![2, 4]);
    }

    #[test]
    fn test_cadence_and_disabled_saving() {
        let dir = tempdir().unwrap();
        let model = encoder_cfg().init::<TestBackend>(&Default::default());

        let mut every_two = CheckpointManager::new(dir.path().join("a"), RetentionPolicy { save_top_k: -1, every_n_epochs: 2 }).unwrap();
        for epoch in 1..=5 {
            every_two.on_validation_end::<TestBackend, _>(&model, epoch, 1.0 / epoch as f64).unwrap();
        }
        assert_eq!(epochs(&every_two), vec![2, 4]);

        let mut never = CheckpointManager::new(dir.path().join("b"), RetentionPolicy { save_top_k: 0, every_n_epochs: 1 }).unwrap();
        assert!(!never.on_validation_end::<TestBackend, _>(&model, 1, 0.1).unwrap());
        assert!(never.best().is_none());
    }

    #[test]
    fn test_load_best_restores_weights() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let trained = encoder_cfg().init::<TestBackend>(&device);
        let mut mgr = CheckpointManager::new(dir.path(), RetentionPolicy { save_top_k: 1, every_n_epochs: 1 }).unwrap();
        mgr.on_validation_end::<TestBackend, _>(&trained, 1, 0.3).unwrap();

        let fresh = encoder_cfg().init::<TestBackend>(&device);
        let mut loaded = mgr.load_best::<TestBackend, _>(fresh, &device).unwrap();
        loaded.set_stats_mode(StatsMode::Eval);

        let a: Vec<f32> = trained.classifier.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.classifier.weight.val().into_data().to_vec().unwrap();
        // CompactRecorder stores half precision
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_record_extension_matches_recorder() {
        use burn::record::FileRecorder;
        assert_eq!(RECORD_EXTENSION, <CompactRecorder as FileRecorder<TestBackend>>::file_extension());
    }

    #[test]
    fn test_new_session_discards_previous_index() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let keep_all = RetentionPolicy { save_top_k: -1, every_n_epochs: 1 };

        let first = encoder_cfg().init::<TestBackend>(&device);
        let mut run1 = CheckpointManager::new(dir.path(), keep_all).unwrap();
        run1.on_validation_end::<TestBackend, _>(&first, 1, 0.1).unwrap();
        run1.on_validation_end::<TestBackend, _>(&first, 2, 0.2).unwrap();

        let second = encoder_cfg().init::<TestBackend>(&device);
        let mut run2 = CheckpointManager::new(dir.path(), keep_all).unwrap();
        assert!(run2.entries().is_empty());
        assert!(!dir.path().join("model_epoch_2.mpk").exists());
        run2.on_validation_end::<TestBackend, _>(&second, 1, 0.9).unwrap();

        let reopened = CheckpointManager::open(dir.path()).unwrap();
        assert_eq!(reopened.entries(), &[CheckpointEntry { epoch: 1, val_loss: 0.9 }]);

        // The best record is the second run's weights
        let loaded = reopened.load_best::<TestBackend, _>(encoder_cfg().init(&device), &device).unwrap();
        let want: Vec<f32> = second.classifier.weight.val().into_data().to_vec().unwrap();
        let got: Vec<f32> = loaded.classifier.weight.val().into_data().to_vec().unwrap();
        for (x, y) in want.iter().zip(&got) {
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_malformed_index_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("checkpoints.json"), "not json").unwrap();
        assert!(CheckpointManager::open(dir.path()).is_err());
        assert!(CheckpointManager::new(dir.path(), RetentionPolicy { save_top_k: 1, every_n_epochs: 1 }).is_err());
    }

    #[test]
    fn test_load_without_index_fails() {
        let dir = tempdir().unwrap();
        assert!(CheckpointManager::open(dir.path()).is_err());
    }
}
