// ============================================================
// Layer 5 — Predictor
// ============================================================
// Rebuilds the encoder from hparams.json, loads the lowest
// val_loss checkpoint and runs predict_step over unlabelled
// batches. Output rows keep the dataset order.

use anyhow::{ensure, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Wgpu},
    data::dataloader::DataLoaderBuilder,
    prelude::*,
};

use crate::data::{batcher::QaLabelBatcher, dataset::QaLabelDataset};
use crate::domain::labels::LABEL_WIDTH;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    labeler::QaLabeler,
    model::{QaEncoder, QaEncoderConfig},
};

pub type InferBackend = Wgpu;

/// Probabilities for one Q&A pair
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub qa_id:  u64,
    pub scores: Vec<f32>,
}

pub struct Predictor<B: Backend> {
    labeler: QaLabeler<B, QaEncoder<B>>,
    device:  B::Device,
}

impl Predictor<InferBackend> {
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        Self::load(ckpt_manager, WgpuDevice::default())
    }
}

impl<B: Backend> Predictor<B> {
    pub fn load(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg = ckpt_manager.load_config()?;
        let encoder_cfg = QaEncoderConfig { dropout: 0.0, ..cfg.encoder_config() };
        let encoder: QaEncoder<B> = encoder_cfg.init(&device);
        let encoder = ckpt_manager.load_best::<B, _>(encoder, &device)?;
        tracing::info!("Model loaded from checkpoint");

        Ok(Self::new(QaLabeler::new(encoder, cfg.labeler_hparams()), device))
    }

    pub fn new(labeler: QaLabeler<B, QaEncoder<B>>, device: B::Device) -> Self {
        Self { labeler: labeler.eval(), device }
    }

    /// Score every sample; labels in the dataset are ignored
    pub fn predict(&self, dataset: QaLabelDataset, batch_size: usize) -> Result<Vec<Prediction>> {
        ensure!(batch_size > 0, "batch_size must be at least 1");
        let expected = dataset.sample_count();

        // No shuffling, so rows come back in file order
        let loader = DataLoaderBuilder::new(QaLabelBatcher::<B>::new(self.device.clone()))
            .batch_size(batch_size)
            .build(dataset);

        let mut out = Vec::with_capacity(expected);
        for batch in loader.iter() {
            let probs = self.labeler.predict_step(&batch);
            let flat: Vec<f32> = probs
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| anyhow::anyhow!("Cannot read predictions: {e:?}"))?;

            out.extend(
                batch
                    .qa_ids
                    .iter()
                    .zip(flat.chunks(LABEL_WIDTH))
                    .map(|(&qa_id, row)| Prediction { qa_id, scores: row.to_vec() }),
            );
        }

        tracing::info!("Scored {} Q&A pairs", out.len());
        Ok(out)
    }
}
