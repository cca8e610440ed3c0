use burn::{
    module::{Ignored, RunningState},
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{gelu, softmax},
};

use crate::domain::{labels::LABEL_WIDTH, stats_mode::StatsMode};
use crate::ml::scorer::{
    embedding_params, layer_norm_params, linear_params, LabelScorer, NamedParam,
};

// Large negative score for padded key positions before softmax
const MASKED_SCORE: f64 = -1.0e4;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct QaEncoderConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    /// Question / answer segment ids
    #[config(default = 2)]
    pub type_vocab_size: usize,
    #[config(default = 0.1)]
    pub norm_momentum: f64,
}

impl QaEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> QaEncoder<B> {
        let token_embedding      = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding   = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let token_type_embedding = EmbeddingConfig::new(self.type_vocab_size, self.d_model).init(device);
        let embed_norm = LayerNormConfig::new(self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let pooler_norm = RunningNorm::new(self.d_model, self.norm_momentum, device);
        let classifier  = LinearConfig::new(self.d_model, LABEL_WIDTH).init(device);
        let dropout     = DropoutConfig::new(self.dropout).init();
        QaEncoder {
            token_embedding, position_embedding, token_type_embedding, embed_norm,
            layers, pooler_norm, classifier, dropout,
            mode: Ignored(StatsMode::Train),
            max_seq_len: self.max_seq_len,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let d_head = self.d_model / self.num_heads;
        let self_attn = SelfAttention {
            query:   LinearConfig::new(self.d_model, self.d_model).init(device),
            key:     LinearConfig::new(self.d_model, self.d_model).init(device),
            value:   LinearConfig::new(self.d_model, self.d_model).init(device),
            output:  LinearConfig::new(self.d_model, self.d_model).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            n_heads: self.num_heads,
            d_head,
        };
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

/// Apply dropout only while statistics are live
fn maybe_dropout<B: Backend, const D: usize>(
    dropout: &Dropout,
    x:       Tensor<B, D>,
    mode:    StatsMode,
) -> Tensor<B, D> {
    if mode.is_train() { dropout.forward(x) } else { x }
}

// ─── Self-attention with padding mask ─────────────────────────────────────────

#[derive(Module, Debug)]
pub struct SelfAttention<B: Backend> {
    pub query:   Linear<B>,
    pub key:     Linear<B>,
    pub value:   Linear<B>,
    pub output:  Linear<B>,
    pub dropout: Dropout,
    pub n_heads: usize,
    pub d_head:  usize,
}

impl<B: Backend> SelfAttention<B> {
    /// x: [batch, seq, d_model], pad_mask: [batch, seq] (true = padding)
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>, mode: StatsMode) -> Tensor<B, 3> {
        let [batch, seq_len, d_model] = x.dims();
        let heads = |t: Tensor<B, 3>| {
            t.reshape([batch, seq_len, self.n_heads, self.d_head]).swap_dims(1, 2)
        };

        let q = heads(self.query.forward(x.clone()));
        let k = heads(self.key.forward(x.clone()));
        let v = heads(self.value.forward(x));

        // [batch, heads, seq, seq]
        let scores = q
            .matmul(k.swap_dims(2, 3))
            .div_scalar((self.d_head as f64).sqrt());
        let mask = pad_mask
            .reshape([batch, 1, 1, seq_len])
            .expand([batch, self.n_heads, seq_len, seq_len]);
        let weights = softmax(scores.mask_fill(mask, MASKED_SCORE), 3);
        let weights = maybe_dropout(&self.dropout, weights, mode);

        let context = weights
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, seq_len, d_model]);
        self.output.forward(context)
    }

    fn named_params(&self, prefix: &str, out: &mut Vec<NamedParam>) {
        linear_params(&format!("{prefix}.self.query"), &self.query, out);
        linear_params(&format!("{prefix}.self.key"), &self.key, out);
        linear_params(&format!("{prefix}.self.value"), &self.value, out);
        linear_params(&format!("{prefix}.output.dense"), &self.output, out);
    }
}

// ─── Encoder block ────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   SelfAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>, mode: StatsMode) -> Tensor<B, 3> {
        let attn_output = self.self_attn.forward(x.clone(), pad_mask, mode);
        let x = self.norm1.forward(x + maybe_dropout(&self.dropout, attn_output, mode));
        let ffn_out = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(x.clone())));
        self.norm2.forward(x + maybe_dropout(&self.dropout, ffn_out, mode))
    }

    fn named_params(&self, prefix: &str, out: &mut Vec<NamedParam>) {
        self.self_attn.named_params(&format!("{prefix}.attention"), out);
        layer_norm_params(&format!("{prefix}.attention.output.LayerNorm"), &self.norm1, out);
        linear_params(&format!("{prefix}.intermediate.dense"), &self.ffn_linear1, out);
        linear_params(&format!("{prefix}.output.dense"), &self.ffn_linear2, out);
        layer_norm_params(&format!("{prefix}.output.LayerNorm"), &self.norm2, out);
    }
}

// ─── Running-statistics normalisation ─────────────────────────────────────────
// Normalises pooled features per dimension. In `Train` mode it
// uses the batch statistics and folds them into the running
// mean/variance; in `Eval` mode it uses the running values and
// leaves them untouched. No learnable parameters.

#[derive(Module, Debug)]
pub struct RunningNorm<B: Backend> {
    pub running_mean: RunningState<Tensor<B, 1>>,
    pub running_var:  RunningState<Tensor<B, 1>>,
    pub momentum:     f64,
    pub epsilon:      f64,
}

impl<B: Backend> RunningNorm<B> {
    pub fn new(d_model: usize, momentum: f64, device: &B::Device) -> Self {
        Self {
            running_mean: RunningState::new(Tensor::zeros([d_model], device)),
            running_var:  RunningState::new(Tensor::ones([d_model], device)),
            momentum,
            epsilon: 1e-5,
        }
    }

    /// x: [batch, d_model]
    pub fn forward(&self, x: Tensor<B, 2>, mode: StatsMode) -> Tensor<B, 2> {
        let [_, d_model] = x.dims();

        let (mean, var) = if mode.is_train() {
            let mean = x.clone().mean_dim(0);
            let var  = (x.clone() - mean.clone()).powf_scalar(2.0).mean_dim(0);

            let m = self.momentum;
            let running_mean = self.running_mean.value_sync();
            let running_var  = self.running_var.value_sync();
            self.running_mean.update(
                running_mean.mul_scalar(1.0 - m) + mean.clone().detach().reshape([d_model]).mul_scalar(m),
            );
            self.running_var.update(
                running_var.mul_scalar(1.0 - m) + var.clone().detach().reshape([d_model]).mul_scalar(m),
            );
            (mean, var)
        } else {
            (
                self.running_mean.value_sync().reshape([1, d_model]),
                self.running_var.value_sync().reshape([1, d_model]),
            )
        };

        (x - mean).div(var.add_scalar(self.epsilon).sqrt())
    }
}

// ─── QaEncoder ────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct QaEncoder<B: Backend> {
    pub token_embedding:      Embedding<B>,
    pub position_embedding:   Embedding<B>,
    pub token_type_embedding: Embedding<B>,
    pub embed_norm:           LayerNorm<B>,
    pub layers:               Vec<EncoderBlock<B>>,
    pub pooler_norm:          RunningNorm<B>,
    pub classifier:           Linear<B>,
    pub dropout:              Dropout,
    pub mode:                 Ignored<StatsMode>,
    pub max_seq_len:          usize,
}

impl<B: Backend> QaEncoder<B> {
    /// Masked mean over real tokens: [batch, seq, d] → [batch, d]
    fn pool(x: Tensor<B, 3>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, seq_len, d_model] = x.dims();
        let mask = attention_mask.float().reshape([batch, seq_len, 1]);
        let summed = (x * mask.clone()).sum_dim(1).reshape([batch, d_model]);
        let counts = mask.sum_dim(1).reshape([batch, 1]).clamp_min(1.0);
        summed / counts
    }
}

impl<B: Backend> LabelScorer<B> for QaEncoder<B> {
    fn score(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let mode = self.mode.0;
        let [batch_size, seq_len] = input_ids.dims();

        // Sequences longer than the position table are truncated
        let seq_len = seq_len.min(self.max_seq_len);
        let input_ids      = input_ids.slice([0..batch_size, 0..seq_len]);
        let attention_mask = attention_mask.slice([0..batch_size, 0..seq_len]);
        let token_type_ids = token_type_ids.slice([0..batch_size, 0..seq_len]);

        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &input_ids.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);

        let x = self.token_embedding.forward(input_ids)
            + self.position_embedding.forward(positions)
            + self.token_type_embedding.forward(token_type_ids);
        let mut x = maybe_dropout(&self.dropout, self.embed_norm.forward(x), mode);

        let pad_mask = attention_mask.clone().equal_elem(0);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone(), mode);
        }

        let pooled = self.pooler_norm.forward(Self::pool(x, attention_mask), mode);
        self.classifier.forward(maybe_dropout(&self.dropout, pooled, mode))
    }

    fn stats_mode(&self) -> StatsMode {
        self.mode.0
    }

    fn set_stats_mode(&mut self, mode: StatsMode) {
        self.mode = Ignored(mode);
    }

    fn named_parameters(&self) -> Vec<NamedParam> {
        let mut out = Vec::new();
        embedding_params("embeddings.word_embeddings", &self.token_embedding, &mut out);
        embedding_params("embeddings.position_embeddings", &self.position_embedding, &mut out);
        embedding_params("embeddings.token_type_embeddings", &self.token_type_embedding, &mut out);
        layer_norm_params("embeddings.LayerNorm", &self.embed_norm, &mut out);
        for (i, layer) in self.layers.iter().enumerate() {
            layer.named_params(&format!("encoder.layer.{i}"), &mut out);
        }
        linear_params("classifier", &self.classifier, &mut out);
        out
    }
}
