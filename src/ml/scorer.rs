// ============================================================
// Layer 5 — Label Scorer Contract
// ============================================================
// The labeler does not care which encoder produces its logits.
// Any Burn module that can turn (token ids, attention mask,
// token-type ids) into one logit per label column can be
// plugged in by implementing `LabelScorer`.
//
// Besides scoring, a scorer must:
//   - expose a statistics-mode switch (dropout / running stats)
//   - list its trainable parameters under stable, dotted names
//     so the optimizer builder can group them for weight decay

use burn::{
    module::ParamId,
    nn::{Embedding, LayerNorm, Linear},
    prelude::*,
};

use crate::domain::stats_mode::StatsMode;

/// A trainable parameter and its fully-qualified name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedParam {
    pub name: String,
    pub id:   ParamId,
}

impl NamedParam {
    pub fn new(name: impl Into<String>, id: ParamId) -> Self {
        Self { name: name.into(), id }
    }

    /// Prepend `prefix.` to the name
    pub fn prefixed(self, prefix: &str) -> Self {
        Self { name: format!("{prefix}.{}", self.name), id: self.id }
    }
}

pub trait LabelScorer<B: Backend>: Module<B> {
    /// `[batch, seq]` × 3 → `[batch, LABEL_WIDTH]` logits
    fn score(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2>;

    fn stats_mode(&self) -> StatsMode;

    fn set_stats_mode(&mut self, mode: StatsMode);

    /// Every trainable parameter, each listed once
    fn named_parameters(&self) -> Vec<NamedParam>;
}

// ─── Naming helpers for Burn's built-in layers ────────────────────────────────

pub fn linear_params<B: Backend>(prefix: &str, layer: &Linear<B>, out: &mut Vec<NamedParam>) {
    out.push(NamedParam::new(format!("{prefix}.weight"), layer.weight.id));
    if let Some(bias) = &layer.bias {
        out.push(NamedParam::new(format!("{prefix}.bias"), bias.id));
    }
}

pub fn layer_norm_params<B: Backend>(prefix: &str, norm: &LayerNorm<B>, out: &mut Vec<NamedParam>) {
    out.push(NamedParam::new(format!("{prefix}.weight"), norm.gamma.id));
    out.push(NamedParam::new(format!("{prefix}.bias"), norm.beta.id));
}

pub fn embedding_params<B: Backend>(prefix: &str, emb: &Embedding<B>, out: &mut Vec<NamedParam>) {
    out.push(NamedParam::new(format!("{prefix}.weight"), emb.weight.id));
}

// ─── Test support ─────────────────────────────────────────────────────────────

/// Ids of every gradient-tracked float tensor Burn itself finds in `module`.
/// Running statistics are visited too but never require grad.
#[cfg(test)]
pub(crate) fn trainable_param_ids<B: Backend, M: Module<B>>(module: &M) -> std::collections::HashSet<ParamId> {
    use burn::module::ModuleVisitor;

    struct Collector(std::collections::HashSet<ParamId>);

    impl<B: Backend> ModuleVisitor<B> for Collector {
        fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
            if tensor.is_require_grad() {
                self.0.insert(id);
            }
        }
    }

    let mut collector = Collector(Default::default());
    module.visit(&mut collector);
    collector.0
}
