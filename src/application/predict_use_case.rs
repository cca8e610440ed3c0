// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Scores a JSONL file with the best checkpoint and writes
//
//   qa_id,target_00,target_01,...,target_29
//
// one row per input line, in input order.

use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::data::{dataset::QaLabelDataset, loader::JsonlLoader};
use crate::domain::labels::{column_name, LABEL_WIDTH};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::{InferBackend, Prediction, Predictor};

pub struct PredictUseCase {
    predictor:  Predictor<InferBackend>,
    batch_size: usize,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, batch_size: usize) -> Result<Self> {
        let ckpt_manager = CheckpointManager::open(checkpoint_dir)?;
        let predictor = Predictor::from_checkpoint(&ckpt_manager)?;
        Ok(Self { predictor, batch_size })
    }

    /// Score `input` and write the CSV to `output`.
    /// Returns the number of rows written.
    pub fn execute(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<usize> {
        let samples = JsonlLoader::new(input.as_ref()).load_all()?;
        tracing::info!("Loaded {} Q&A pairs for prediction", samples.len());

        let predictions = self
            .predictor
            .predict(QaLabelDataset::new(samples), self.batch_size)?;
        write_csv(output.as_ref(), &predictions)?;
        Ok(predictions.len())
    }
}

pub fn write_csv(path: &Path, predictions: &[Prediction]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut w = BufWriter::new(file);

    let header: Vec<String> = (0..LABEL_WIDTH).map(column_name).collect();
    writeln!(w, "qa_id,{}", header.join(","))?;

    for p in predictions {
        let cells: Vec<String> = p.scores.iter().map(|s| format!("{s:.6}")).collect();
        writeln!(w, "{},{}", p.qa_id, cells.join(","))?;
    }
    w.flush()?;

    tracing::info!("Wrote {} predictions to '{}'", predictions.len(), path.display());
    Ok(())
}
