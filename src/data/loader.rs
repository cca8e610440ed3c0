// ============================================================
// Layer 4 — Sample Loader
// ============================================================
// Reads pre-tokenised Q&A pairs from a JSON Lines file, one
// sample per line:
//
//   {"qa_id": 17, "input_ids": [...], "attention_mask": [...],
//    "token_type_ids": [...], "labels": [30 floats]}
//
// Tokenisation happens upstream; by the time a file reaches
// this loader every sequence is already a list of token ids.
// Blank lines are skipped. A malformed line aborts the load and
// reports its line number.

use anyhow::{ensure, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::data::dataset::QaLabelSample;
use crate::domain::labels::LABEL_WIDTH;

pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Load every sample in the file
    pub fn load_all(&self) -> Result<Vec<QaLabelSample>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open samples file '{}'", self.path.display()))?;

        let mut samples = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line_no = idx + 1;
            let line = line
                .with_context(|| format!("Cannot read line {line_no} of '{}'", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }

            let sample: QaLabelSample = serde_json::from_str(&line)
                .with_context(|| format!("Malformed sample on line {line_no} of '{}'", self.path.display()))?;
            validate(&sample).with_context(|| format!("Invalid sample on line {line_no}"))?;
            samples.push(sample);
        }

        tracing::info!("Loaded {} samples from '{}'", samples.len(), self.path.display());
        Ok(samples)
    }

    /// Load samples, requiring every one to carry labels
    pub fn load_labelled(&self) -> Result<Vec<QaLabelSample>> {
        let samples = self.load_all()?;
        if let Some(s) = samples.iter().find(|s| !s.is_labelled()) {
            anyhow::bail!(
                "sample qa_id={} in '{}' has no labels; training data must be labelled",
                s.qa_id,
                self.path.display()
            );
        }
        Ok(samples)
    }
}

fn validate(sample: &QaLabelSample) -> Result<()> {
    let n = sample.input_ids.len();
    ensure!(n > 0, "qa_id={} has an empty input_ids sequence", sample.qa_id);
    ensure!(
        sample.attention_mask.len() == n && sample.token_type_ids.len() == n,
        "qa_id={}: input_ids, attention_mask and token_type_ids lengths differ ({}, {}, {})",
        sample.qa_id,
        n,
        sample.attention_mask.len(),
        sample.token_type_ids.len(),
    );
    if let Some(labels) = &sample.labels {
        ensure!(
            labels.len() == LABEL_WIDTH,
            "qa_id={}: expected {LABEL_WIDTH} labels, found {}",
            sample.qa_id,
            labels.len()
        );
    }
    Ok(())
}
