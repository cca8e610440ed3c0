// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop driving a QaLabeler with Burn's DataLoader and the
// grouped AdamW optimiser.
//
// Per epoch:
//   1. on_train_epoch_start, then at most `limit_train_batches`
//      training steps, each followed by one optimiser update
//   2. validation on labeler.valid() (inner backend, eval mode)
//   3. one stdout line, one metrics.csv row, one retention decision
//
// Epoch values are batch-size weighted means of the step values.
// Training runs on TrainBackend (Autodiff<Wgpu>); validation
// batches are built directly on the inner backend.

use anyhow::{ensure, Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    data::dataloader::DataLoaderBuilder,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, Rng};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::QaLabelBatcher, dataset::QaLabelDataset};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MeanAccumulator, MetricsLogger},
};
use crate::ml::{labeler::QaLabeler, model::QaEncoder};

pub type TrainBackend = Autodiff<Wgpu>;

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub best_epoch:    usize,
    pub best_val_loss: f64,
    pub best_val_rho:  f64,
    pub history:       Vec<EpochMetrics>,
}

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: QaLabelDataset,
    val_dataset:   QaLabelDataset,
    ckpt_manager:  CheckpointManager,
    metrics:       MetricsLogger,
    rng:           &mut StdRng,
) -> Result<TrainingSummary> {
    let device = WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    fit::<TrainBackend>(cfg, train_dataset, val_dataset, ckpt_manager, metrics, device, rng.gen())
}

pub fn fit<B: AutodiffBackend>(
    cfg:              &TrainConfig,
    train_dataset:    QaLabelDataset,
    val_dataset:      QaLabelDataset,
    mut ckpt_manager: CheckpointManager,
    metrics:          MetricsLogger,
    device:           B::Device,
    shuffle_seed:     u64,
) -> Result<TrainingSummary> {
    ensure!(val_dataset.sample_count() > 0, "validation set is empty");

    // ── Build labeler ─────────────────────────────────────────────────────────
    let encoder: QaEncoder<B> = cfg.encoder_config().init(&device);
    let mut labeler = QaLabeler::new(encoder, cfg.labeler_hparams());
    let mut optim   = labeler.configure_optimizers();
    if labeler.hparams().freeze {
        tracing::info!("Freeze on: dropout and running statistics stay in eval mode");
    }
    let (decay, no_decay) = optim.group_sizes();
    tracing::info!(
        "Model ready: {} layers, d_model={}, {} decayed / {} undecayed tensors",
        cfg.num_layers, cfg.d_model, decay, no_decay
    );

    let train_batches = cfg
        .limit_train_batches
        .resolve(train_dataset.batch_count(cfg.batch_size));
    tracing::info!(
        "{} training batches per epoch ({})",
        train_batches, cfg.limit_train_batches
    );

    // ── Training data loader (autodiff backend) ───────────────────────────────
    let train_loader = DataLoaderBuilder::new(QaLabelBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(shuffle_seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation data loader (inner backend, no autodiff overhead) ──────────
    let val_loader = DataLoaderBuilder::new(QaLabelBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let mut history: Vec<EpochMetrics> = Vec::with_capacity(cfg.epochs);
    let mut best: Option<EpochMetrics> = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        labeler.on_train_epoch_start();
        let mut train_loss = MeanAccumulator::default();

        for batch in train_loader.iter().take(train_batches) {
            let step = labeler.training_step(&batch)?;
            train_loss.add(step.loss.clone().into_scalar().elem::<f64>(), step.batch_size);
            labeler = labeler.optimizer_step(&mut optim, step.loss);
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let labeler_valid = labeler.valid();
        let mut val_loss = MeanAccumulator::default();
        let mut val_rho  = MeanAccumulator::default();

        for batch in val_loader.iter() {
            let step = labeler_valid.validation_step(&batch)?;
            val_loss.add(step.val_loss, step.batch_size);
            val_rho.add(step.val_rho, step.batch_size);
        }

        let row = EpochMetrics::new(epoch, train_loss.mean(), val_loss.mean(), val_rho.mean());

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_rho={:.4}",
            epoch, cfg.epochs, row.train_loss, row.val_loss, row.val_rho,
        );
        metrics.log(&row)?;

        if ckpt_manager.on_validation_end::<B::InnerBackend, _>(labeler_valid.scorer(), epoch, row.val_loss)? {
            tracing::debug!("Checkpoint kept for epoch {}", epoch);
        }

        if best.as_ref().map_or(true, |b| row.is_improvement(b.val_loss)) {
            best = Some(row.clone());
        }
        history.push(row);
    }

    tracing::info!(
        "Training complete! {} checkpoint(s) kept, metrics in '{}'",
        ckpt_manager.entries().len(),
        metrics.csv_path().display()
    );

    let best = best.context("no epochs were run")?;
    Ok(TrainingSummary {
        best_epoch:    best.epoch,
        best_val_loss: best.val_loss,
        best_val_rho:  best.val_rho,
        history,
    })
}
