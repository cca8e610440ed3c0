use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One pre-tokenised Q&A pair.
/// `labels` is absent for inference-only data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaLabelSample {
    pub qa_id:          u64,
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels:         Option<Vec<f32>>,
}

impl QaLabelSample {
    pub fn seq_len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_labelled(&self) -> bool {
        self.labels.is_some()
    }
}

pub struct QaLabelDataset {
    samples: Vec<QaLabelSample>,
}

impl QaLabelDataset {
    pub fn new(samples: Vec<QaLabelSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    /// Number of batches one pass produces, counting a final partial batch
    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.samples.len().div_ceil(batch_size.max(1))
    }
}

impl Dataset<QaLabelSample> for QaLabelDataset {
    fn get(&self, index: usize) -> Option<QaLabelSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
