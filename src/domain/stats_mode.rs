// ============================================================
// Layer 3 — Statistics Mode
// ============================================================
// Layers such as dropout and running-statistics normalisation
// behave differently while learning and while evaluating.
// This flag is independent of gradient tracking: a scorer in
// `Eval` mode on an autodiff backend still produces gradients.

/// How statistics-bearing layers behave during a forward pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatsMode {
    /// Dropout active, normalisation uses and updates batch statistics
    #[default]
    Train,
    /// Dropout disabled, normalisation uses frozen running statistics
    Eval,
}

impl StatsMode {
    pub fn is_train(self) -> bool {
        matches!(self, StatsMode::Train)
    }
}
