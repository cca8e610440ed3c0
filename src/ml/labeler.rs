// ============================================================
// Layer 5 — QaLabeler
// ============================================================
// Wraps a LabelScorer with the training, validation and
// inference behaviour of the Q&A quality labeler:
//
//   training_step    segmented, weighted BCE (freeze-aware)
//   validation_step  unweighted BCE + mean column Spearman
//   predict_step     sigmoid probabilities, labels not needed
//   test_step        no-op
//
// Every entry point goes through `forward`, so the mapping from
// inputs to logits is defined in exactly one place.
//
// The training loss is weighted per segment while the validation
// loss is a plain mean over all 30 columns. The weights shape the
// optimisation; the reported validation signal stays comparable
// across weight settings.

use std::marker::PhantomData;

use anyhow::{ensure, Context, Result};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    tensor::{activation::sigmoid, backend::AutodiffBackend},
};

use crate::data::batcher::QaLabelBatch;
use crate::domain::{labels::LABEL_WIDTH, loss_weights::LossWeights, stats_mode::StatsMode};
use crate::ml::{
    metric::mean_column_spearman,
    objective::{bce_with_logits, multi_task_loss},
    optimizer::{grouped_adamw, GroupedOptimizer},
    scorer::{LabelScorer, NamedParam},
};

/// Hyperparameters fixed for the whole session
#[derive(Debug, Clone, PartialEq)]
pub struct LabelerHparams {
    pub lr:           f64,
    pub loss_weights: LossWeights,
    pub freeze:       bool,
}

/// Result of one training step
pub struct TrainStep<B: Backend> {
    /// Differentiable loss, shape [1]
    pub loss:       Tensor<B, 1>,
    pub batch_size: usize,
}

/// Result of one validation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationStep {
    pub val_loss:   f64,
    pub val_rho:    f64,
    pub batch_size: usize,
}

pub struct QaLabeler<B: Backend, S> {
    scorer:   S,
    hparams:  LabelerHparams,
    _backend: PhantomData<B>,
}

impl<B: Backend, S: LabelScorer<B>> QaLabeler<B, S> {
    pub fn new(scorer: S, hparams: LabelerHparams) -> Self {
        Self { scorer, hparams, _backend: PhantomData }
    }

    pub fn hparams(&self) -> &LabelerHparams {
        &self.hparams
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Switch statistics-bearing layers to inference behaviour
    pub fn eval(mut self) -> Self {
        self.scorer.set_stats_mode(StatsMode::Eval);
        self
    }

    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        self.scorer.score(input_ids, attention_mask, token_type_ids)
    }

    fn forward_batch(&self, batch: &QaLabelBatch<B>) -> Tensor<B, 2> {
        self.forward(
            batch.input_ids.clone(),
            batch.attention_mask.clone(),
            batch.token_type_ids.clone(),
        )
    }

    /// Trainable parameters, named relative to the labeler
    pub fn named_parameters(&self) -> Vec<NamedParam> {
        self.scorer
            .named_parameters()
            .into_iter()
            .map(|p| p.prefixed("scorer"))
            .collect()
    }

    /// Restore live statistics at the start of each training epoch
    pub fn on_train_epoch_start(&mut self) {
        self.scorer.set_stats_mode(StatsMode::Train);
    }

    pub fn training_step(&mut self, batch: &QaLabelBatch<B>) -> Result<TrainStep<B>> {
        let labels = labels_of(batch)?;

        if self.hparams.freeze && self.scorer.stats_mode().is_train() {
            self.scorer.set_stats_mode(StatsMode::Eval);
        }
        let logits = self.forward_batch(batch);
        let loss   = multi_task_loss(logits, labels, &self.hparams.loss_weights);

        Ok(TrainStep { loss, batch_size: batch.batch_size() })
    }

    pub fn validation_step(&self, batch: &QaLabelBatch<B>) -> Result<ValidationStep> {
        let labels = labels_of(batch)?;
        let logits = self.forward_batch(batch);

        let val_loss = bce_with_logits(logits.clone(), labels.clone())
            .into_scalar()
            .elem::<f64>();

        let preds = to_host(sigmoid(logits))?;
        let truth = to_host(labels)?;
        let val_rho = mean_column_spearman(&truth, &preds, LABEL_WIDTH);

        Ok(ValidationStep { val_loss, val_rho, batch_size: batch.batch_size() })
    }

    /// `[batch, 30]` probabilities; labels are ignored if present
    pub fn predict_step(&self, batch: &QaLabelBatch<B>) -> Tensor<B, 2> {
        sigmoid(self.forward_batch(batch))
    }

    pub fn test_step(&self, _batch: &QaLabelBatch<B>) {}
}

impl<B, S> QaLabeler<B, S>
where
    B: AutodiffBackend,
    S: LabelScorer<B> + AutodiffModule<B>,
    S::InnerModule: LabelScorer<B::InnerBackend>,
{
    /// Grouped AdamW over this labeler's parameters
    pub fn configure_optimizers(&self) -> GroupedOptimizer<impl Optimizer<S, B>> {
        grouped_adamw::<B, S>(self.named_parameters())
    }

    /// Back-propagate `loss` and apply one optimizer update
    pub fn optimizer_step(self, optim: &mut GroupedOptimizer<impl Optimizer<S, B>>, loss: Tensor<B, 1>) -> Self {
        let mut grads = loss.backward();
        let scorer = optim.step(self.hparams.lr, self.scorer, &mut grads);
        Self { scorer, hparams: self.hparams, _backend: PhantomData }
    }

    /// Gradient-free copy for validation, always in eval mode
    pub fn valid(&self) -> QaLabeler<B::InnerBackend, S::InnerModule> {
        QaLabeler::new(self.scorer.valid(), self.hparams.clone()).eval()
    }
}

fn labels_of<B: Backend>(batch: &QaLabelBatch<B>) -> Result<Tensor<B, 2>> {
    let labels = batch
        .labels
        .clone()
        .context("batch has no labels; only predict_step accepts unlabelled batches")?;
    let [rows, width] = labels.dims();
    ensure!(
        width == LABEL_WIDTH && rows == batch.batch_size(),
        "label tensor has shape [{rows}, {width}], expected [{}, {LABEL_WIDTH}]",
        batch.batch_size()
    );
    Ok(labels)
}

fn to_host<B: Backend>(t: Tensor<B, 2>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::QaLabelBatcher, dataset::QaLabelSample};
    use crate::ml::model::QaEncoderConfig;
    use approx::assert_relative_eq;
    use burn::{
        backend::{Autodiff, NdArray},
        data::dataloader::batcher::Batcher,
        module::{Ignored, Param},
    };

    type TestBackend     = Autodiff<NdArray>;
    type TestInnerBackend = NdArray;

    /// Scores every row with the same learnable logits
    #[derive(Module, Debug)]
    struct BiasScorer<B: Backend> {
        bias: Param<Tensor<B, 1>>,
        mode: Ignored<StatsMode>,
    }

    impl<B: Backend> BiasScorer<B> {
        fn zeros(device: &B::Device) -> Self {
            Self {
                bias: Param::from_tensor(Tensor::zeros([LABEL_WIDTH], device)),
                mode: Ignored(StatsMode::Train),
            }
        }
    }

    impl<B: Backend> LabelScorer<B> for BiasScorer<B> {
        fn score(
            &self,
            input_ids:       Tensor<B, 2, Int>,
            _attention_mask: Tensor<B, 2, Int>,
            _token_type_ids: Tensor<B, 2, Int>,
        ) -> Tensor<B, 2> {
            let [batch, _] = input_ids.dims();
            self.bias.val().reshape([1, LABEL_WIDTH]).expand([batch, LABEL_WIDTH])
        }

        fn stats_mode(&self) -> StatsMode {
            self.mode.0
        }

        fn set_stats_mode(&mut self, mode: StatsMode) {
            self.mode = Ignored(mode);
        }

        fn named_parameters(&self) -> Vec<NamedParam> {
            vec![NamedParam::new("bias", self.bias.id)]
        }
    }

    fn hparams(freeze: bool) -> LabelerHparams {
        LabelerHparams {
            lr:           1e-2,
            loss_weights: LossWeights::new(1.5, 0.5).unwrap(),
            freeze,
        }
    }

    fn sample(id: u64, labels: Option<Vec<f32>>) -> QaLabelSample {
        QaLabelSample {
            qa_id:          id,
            input_ids:      vec![1, 2 + id as u32 % 5, 3, 4],
            attention_mask: vec![1, 1, 1, 1],
            token_type_ids: vec![0, 0, 1, 1],
            labels,
        }
    }

    fn batch<B: Backend>(items: Vec<QaLabelSample>) -> QaLabelBatch<B> {
        QaLabelBatcher::<B>::new(Default::default()).batch(items)
    }

    fn varied_labels(seed: u64) -> Vec<f32> {
        (0..LABEL_WIDTH).map(|i| ((i as u64 * 7 + seed * 3) % 5) as f32 / 4.0).collect()
    }

    #[test]
    fn test_zero_logits_zero_labels_loss() {
        let device = Default::default();
        let mut labeler = QaLabeler::<TestBackend, _>::new(BiasScorer::zeros(&device), hparams(false));
        let b = batch::<TestBackend>(vec![
            sample(1, Some(vec![0.0; LABEL_WIDTH])),
            sample(2, Some(vec![0.0; LABEL_WIDTH])),
        ]);

        let step = labeler.training_step(&b).unwrap();
        let loss = step.loss.into_scalar().elem::<f64>();
        assert_relative_eq!(loss, (3.0 * 1.5 + 2.0 * 0.5) * std::f64::consts::LN_2, epsilon = 1e-5);
        assert_eq!(step.batch_size, 2);
    }

    #[test]
    fn test_predict_without_labels() {
        let device = Default::default();
        let labeler = QaLabeler::<TestInnerBackend, _>::new(
            QaEncoderConfig::new(16, 8, 8, 2, 1, 16, 0.1).init(&device),
            hparams(false),
        )
        .eval();
        let b = batch::<TestInnerBackend>(vec![sample(1, None), sample(2, None)]);
        assert!(b.labels.is_none());

        let probs = labeler.predict_step(&b);
        assert_eq!(probs.dims(), [2, LABEL_WIDTH]);
        let values = to_host(probs).unwrap();
        assert!(values.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_training_step_requires_labels() {
        let device = Default::default();
        let mut labeler = QaLabeler::<TestBackend, _>::new(BiasScorer::zeros(&device), hparams(false));
        let b = batch::<TestBackend>(vec![sample(1, None)]);
        assert!(labeler.training_step(&b).is_err());
        assert!(labeler.validation_step(&b).is_err());
    }

    #[test]
    fn test_wrong_label_width_is_an_error() {
        let device = Default::default();
        let mut labeler = QaLabeler::<TestBackend, _>::new(BiasScorer::zeros(&device), hparams(false));
        let b = batch::<TestBackend>(vec![sample(1, Some(vec![0.0; LABEL_WIDTH - 1]))]);
        let err = labeler.training_step(&b).err().unwrap();
        assert!(err.to_string().contains("expected"));
    }

    #[test]
    fn test_validation_step_on_constant_predictions() {
        // All predictions tie, so every column is undefined → rho 0
        let device = Default::default();
        let labeler = QaLabeler::<TestInnerBackend, _>::new(BiasScorer::zeros(&device), hparams(false));
        let b = batch::<TestInnerBackend>(vec![
            sample(1, Some(varied_labels(1))),
            sample(2, Some(varied_labels(2))),
            sample(3, Some(varied_labels(3))),
        ]);

        let out = labeler.validation_step(&b).unwrap();
        assert_eq!(out.val_rho, 0.0);
        assert_relative_eq!(out.val_loss, std::f64::consts::LN_2, epsilon = 1e-5);
    }

    #[test]
    fn test_parameter_groups_cover_encoder() {
        let device = Default::default();
        let labeler = QaLabeler::<TestBackend, _>::new(
            QaEncoderConfig::new(16, 8, 8, 2, 2, 16, 0.1).init(&device),
            hparams(false),
        );
        let names = labeler.named_parameters();
        assert!(names.iter().all(|p| p.name.starts_with("scorer.")));

        let optim = labeler.configure_optimizers();
        let (decay, no_decay) = optim.group_sizes();
        assert_eq!(decay + no_decay, names.len());
        assert!(decay > 0 && no_decay > 0);
    }

    fn pooler_running_mean(l: &QaLabeler<TestBackend, crate::ml::model::QaEncoder<TestBackend>>) -> Vec<f32> {
        to_host(l.scorer().pooler_norm.running_mean.value_sync().unsqueeze::<2>()).unwrap()
    }

    fn classifier_weight(l: &QaLabeler<TestBackend, crate::ml::model::QaEncoder<TestBackend>>) -> Vec<f32> {
        to_host(l.scorer().classifier.weight.val()).unwrap()
    }

    fn run_two_steps(freeze: bool) -> (Vec<f32>, Vec<f32>, Vec<f32>, Vec<f32>) {
        let device = Default::default();
        let mut labeler = QaLabeler::<TestBackend, _>::new(
            QaEncoderConfig::new(16, 8, 8, 2, 1, 16, 0.1).init(&device),
            hparams(freeze),
        );
        let mut optim = labeler.configure_optimizers();
        let b = batch::<TestBackend>(vec![
            sample(1, Some(varied_labels(1))),
            sample(2, Some(varied_labels(2))),
            sample(3, Some(varied_labels(3))),
        ]);

        let mean_before   = pooler_running_mean(&labeler);
        let weight_before = classifier_weight(&labeler);

        for _ in 0..2 {
            labeler.on_train_epoch_start();
            let step = labeler.training_step(&b).unwrap();
            labeler = labeler.optimizer_step(&mut optim, step.loss);
        }

        (mean_before, pooler_running_mean(&labeler), weight_before, classifier_weight(&labeler))
    }

    #[test]
    fn test_freeze_keeps_running_stats_but_learns() {
        let (mean_before, mean_after, w_before, w_after) = run_two_steps(true);
        assert_eq!(mean_before, mean_after);
        assert_ne!(w_before, w_after);
    }

    #[test]
    fn test_unfrozen_training_updates_running_stats() {
        let (mean_before, mean_after, w_before, w_after) = run_two_steps(false);
        assert_ne!(mean_before, mean_after);
        assert_ne!(w_before, w_after);
    }

    #[test]
    fn test_bias_scorer_lists_its_module_tree() {
        use crate::ml::scorer::trainable_param_ids;
        use std::collections::HashSet;

        let scorer = BiasScorer::<TestBackend>::zeros(&Default::default());
        let listed: HashSet<_> = scorer.named_parameters().iter().map(|p| p.id).collect();
        assert_eq!(listed, trainable_param_ids(&scorer));
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_freeze_switches_to_eval_for_the_step() {
        let device = Default::default();
        let mut labeler = QaLabeler::<TestBackend, _>::new(BiasScorer::zeros(&device), hparams(true));
        let b = batch::<TestBackend>(vec![sample(1, Some(varied_labels(1)))]);

        labeler.on_train_epoch_start();
        assert_eq!(labeler.scorer().stats_mode(), StatsMode::Train);
        labeler.training_step(&b).unwrap();
        assert_eq!(labeler.scorer().stats_mode(), StatsMode::Eval);
    }

    #[test]
    fn test_valid_copy_is_in_eval_mode() {
        let device = Default::default();
        let labeler = QaLabeler::<TestBackend, _>::new(BiasScorer::zeros(&device), hparams(false));
        assert_eq!(labeler.scorer().stats_mode(), StatsMode::Train);
        assert_eq!(labeler.valid().scorer().stats_mode(), StatsMode::Eval);
    }
}
