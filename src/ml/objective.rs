//! Binary cross-entropy with logits, plain and segmented.
//!
//! Numerically stable form, per element:
//! ```text
//! L_i = max(x_i, 0) - x_i * t_i + log(1 + exp(-|x_i|))
//! ```
//! Targets may be hard {0, 1} or soft values in [0, 1].

use burn::{prelude::*, tensor::activation::relu};

use crate::domain::{
    labels::{LabelSegment, LABEL_SEGMENTS},
    loss_weights::LossWeights,
};

/// Mean BCE over every element of `logits` / `targets`
pub fn bce_with_logits<B: Backend, const D: usize>(
    logits:  Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let log_term = logits.clone().abs().neg().exp().log1p();
    (relu(logits.clone()) - logits * targets + log_term).mean()
}

/// One BCE per label segment, in segment order
pub fn segment_losses<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 2>) -> Vec<Tensor<B, 1>> {
    let [batch, _] = logits.dims();
    LABEL_SEGMENTS
        .iter()
        .map(|seg: &LabelSegment| {
            bce_with_logits(
                logits.clone().slice([0..batch, seg.range()]),
                labels.clone().slice([0..batch, seg.range()]),
            )
        })
        .collect()
}

/// `w_q * (L1 + L3 + L5) + w_a * (L2 + L4)`
pub fn multi_task_loss<B: Backend>(
    logits:  Tensor<B, 2>,
    labels:  Tensor<B, 2>,
    weights: &LossWeights,
) -> Tensor<B, 1> {
    let device = logits.device();
    segment_losses(logits, labels)
        .into_iter()
        .zip(LABEL_SEGMENTS.iter())
        .fold(Tensor::zeros([1], &device), |acc, (loss, seg)| {
            acc + loss.mul_scalar(weights.for_kind(seg.kind))
        })
}
