// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what a label vector IS:
// its width, its segment layout, how the two loss weights map
// onto segments, and the statistics mode a scorer runs in.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and constants

// The fixed 30-column label layout
pub mod labels;

// Validated question / answer loss weights
pub mod loss_weights;

// Train vs eval behaviour of statistics-bearing layers
pub mod stats_mode;
