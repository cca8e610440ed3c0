// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several layers:
//
//   checkpoint.rs — top-K weights by val_loss, plus hparams.json
//                   so inference can rebuild the encoder
//   metrics.rs    — epoch metrics CSV and weighted step means
//   seed.rs       — backend and host RNG seeding

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Deterministic seeding for a run
pub mod seed;
