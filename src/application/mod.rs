// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Only workflow coordination

// Seeding, splitting, and the training run
pub mod train_use_case;

// Batch scoring of a JSONL file into a CSV
pub mod predict_use_case;
