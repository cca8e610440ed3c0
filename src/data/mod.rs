// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Takes pre-tokenised Q&A pairs from disk to tensor batches:
//
//   samples.jsonl
//       │
//       ▼
//   JsonlLoader       → parses and validates each line
//       │
//       ▼
//   split_train_val   → seeded shuffle + split (if no val file)
//       │
//       ▼
//   QaLabelDataset    → implements Burn's Dataset trait
//       │
//       ▼
//   QaLabelBatcher    → pads and stacks samples into tensors
//       │
//       ▼
//   DataLoader        → feeds batches to the trainer / predictor

/// Reads pre-tokenised samples from JSON Lines
pub mod loader;

/// Implements Burn's Dataset trait for labelled Q&A samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
