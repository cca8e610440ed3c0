// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network, loss, metric and optimiser code.
//
//   scorer.rs     — LabelScorer trait and parameter naming
//   model.rs      — QaEncoder, the default transformer scorer
//   objective.rs  — segmented, weighted BCE
//   metric.rs     — mean column Spearman correlation
//   optimizer.rs  — AdamW with decay / no-decay groups
//   labeler.rs    — training, validation, predict and test steps
//   trainer.rs    — epoch loop, validation, checkpointing
//   inferencer.rs — batch prediction from the best checkpoint

pub mod scorer;
pub mod model;
pub mod objective;
pub mod metric;
pub mod optimizer;
pub mod labeler;
pub mod trainer;
pub mod inferencer;
