// ============================================================
// Layer 4 — Q&A Label Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<QaLabelSample>
// into the tensors the labeler consumes:
//
//   input_ids       [batch, seq]   Int
//   attention_mask  [batch, seq]   Int   (1 = token, 0 = padding)
//   token_type_ids  [batch, seq]   Int   (0 = question, 1 = answer)
//   labels          [batch, 30]    Float (only if every row has them)
//   qa_ids          Vec<u64>             (one per row, kept on host)
//
// Rows shorter than the longest row in the batch are right-padded
// with token 0 and mask 0, so padded positions are ignored by
// attention and pooling.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::QaLabelSample;

// ─── QaLabelBatch ─────────────────────────────────────────────────────────────
/// A batch of Q&A pairs ready for the labeler.
/// `labels` is `None` for inference batches.
#[derive(Debug, Clone)]
pub struct QaLabelBatch<B: Backend> {
    pub input_ids:      Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub token_type_ids: Tensor<B, 2, Int>,
    pub labels:         Option<Tensor<B, 2>>,
    pub qa_ids:         Vec<u64>,
}

impl<B: Backend> QaLabelBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.input_ids.dims()[0]
    }
}

// ─── QaLabelBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct QaLabelBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> QaLabelBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn int_matrix(&self, rows: &[&[u32]], seq_len: usize) -> Tensor<B, 2, Int> {
        let flat: Vec<i32> = rows
            .iter()
            .flat_map(|r| {
                r.iter()
                    .map(|&x| x as i32)
                    .chain(std::iter::repeat(0).take(seq_len - r.len()))
            })
            .collect();

        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([rows.len(), seq_len])
    }
}

impl<B: Backend> Batcher<QaLabelSample, QaLabelBatch<B>> for QaLabelBatcher<B> {
    fn batch(&self, items: Vec<QaLabelSample>) -> QaLabelBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.iter().map(QaLabelSample::seq_len).max().unwrap_or(0);

        let ids:   Vec<&[u32]> = items.iter().map(|s| s.input_ids.as_slice()).collect();
        let masks: Vec<&[u32]> = items.iter().map(|s| s.attention_mask.as_slice()).collect();
        let types: Vec<&[u32]> = items.iter().map(|s| s.token_type_ids.as_slice()).collect();

        // Labels travel only when the whole batch carries them
        let labels = if !items.is_empty() && items.iter().all(QaLabelSample::is_labelled) {
            let width = items[0].labels.as_ref().map_or(0, Vec::len);
            let flat: Vec<f32> = items
                .iter()
                .filter_map(|s| s.labels.as_ref())
                .flat_map(|l| l.iter().copied())
                .collect();
            Some(Tensor::<B, 2>::from_data(
                TensorData::new(flat, [batch_size, width]),
                &self.device,
            ))
        } else {
            None
        };

        QaLabelBatch {
            input_ids:      self.int_matrix(&ids, seq_len),
            attention_mask: self.int_matrix(&masks, seq_len),
            token_type_ids: self.int_matrix(&types, seq_len),
            labels,
            qa_ids:         items.iter().map(|s| s.qa_id).collect(),
        }
    }
}
