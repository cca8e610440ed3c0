// ============================================================
// Layer 5 — Grouped AdamW
// ============================================================
// Weight decay is applied to most parameters but not to biases
// or LayerNorm affine terms. Membership is decided purely by the
// parameter's fully-qualified name:
//
//   group A  (weight_decay = 0.8)  name matches nothing in NO_DECAY_V1
//   group B  (weight_decay = 0.0)  name contains an NO_DECAY_V1 entry
//
// Burn's AdamW carries one weight-decay value per optimizer, so
// each group gets its own AdamW instance. A step hands each
// instance only the gradients of its own group's parameters; both
// share the same learning rate.

use burn::{
    module::{AutodiffModule, ParamId},
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};

use crate::ml::scorer::NamedParam;

/// Name substrings that exempt a parameter from weight decay
pub const NO_DECAY_V1: [&str; 3] = ["bias", "LayerNorm.bias", "LayerNorm.weight"];

pub const DECAY_WEIGHT_DECAY:    f32 = 0.8;
pub const NO_DECAY_WEIGHT_DECAY: f32 = 0.0;

pub fn is_no_decay(name: &str) -> bool {
    NO_DECAY_V1.iter().any(|pattern| name.contains(pattern))
}

#[derive(Debug, Default)]
pub struct ParamGroups {
    pub decay:    Vec<NamedParam>,
    pub no_decay: Vec<NamedParam>,
}

impl ParamGroups {
    pub fn partition(params: Vec<NamedParam>) -> Self {
        let (no_decay, decay) = params.into_iter().partition(|p| is_no_decay(&p.name));
        Self { decay, no_decay }
    }

    pub fn len(&self) -> usize {
        self.decay.len() + self.no_decay.len()
    }
}

/// Two optimizers stepping disjoint parameter sets
pub struct GroupedOptimizer<O> {
    decay:        O,
    no_decay:     O,
    decay_ids:    Vec<ParamId>,
    no_decay_ids: Vec<ParamId>,
}

impl<O> GroupedOptimizer<O> {
    pub fn step<B, M>(&mut self, lr: f64, module: M, grads: &mut B::Gradients) -> M
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let decay_grads    = GradientsParams::from_params(grads, &module, &self.decay_ids);
        let no_decay_grads = GradientsParams::from_params(grads, &module, &self.no_decay_ids);

        let module = self.decay.step(lr, module, decay_grads);
        self.no_decay.step(lr, module, no_decay_grads)
    }

    pub fn group_sizes(&self) -> (usize, usize) {
        (self.decay_ids.len(), self.no_decay_ids.len())
    }
}

/// Build the grouped AdamW over `params`
pub fn grouped_adamw<B, M>(params: Vec<NamedParam>) -> GroupedOptimizer<impl Optimizer<M, B>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let groups = ParamGroups::partition(params);
    tracing::info!(
        "AdamW over {} tensors: {} decayed (wd={}), {} exempt (wd={})",
        groups.len(),
        groups.decay.len(),
        DECAY_WEIGHT_DECAY,
        groups.no_decay.len(),
        NO_DECAY_WEIGHT_DECAY,
    );

    GroupedOptimizer {
        decay:        AdamWConfig::new().with_weight_decay(DECAY_WEIGHT_DECAY).init::<B, M>(),
        no_decay:     AdamWConfig::new().with_weight_decay(NO_DECAY_WEIGHT_DECAY).init::<B, M>(),
        decay_ids:    groups.decay.iter().map(|p| p.id).collect(),
        no_decay_ids: groups.no_decay.iter().map(|p| p.id).collect(),
    }
}
