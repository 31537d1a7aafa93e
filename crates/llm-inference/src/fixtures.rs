//! Small deterministic models for tests and smoke runs.
//!
//! Weight values come from an integer pattern so they are exact in `f32`;
//! norms are all ones and the rotary tables are the standard ones.

use crate::config::ModelConfig;
use crate::rope::frequency_tables;
use crate::tokenizer::Vocabulary;

pub const TOY_ROPE_THETA: f32 = 10000.0;

/// `dim=8, hidden_dim=16, n_layers=2, n_heads=2, vocab_size=6, seq_len=16`, shared classifier.
pub fn toy_config() -> ModelConfig {
    ModelConfig {
        dim: 8,
        hidden_dim: 16,
        n_layers: 2,
        n_heads: 2,
        n_kv_heads: 2,
        vocab_size: 6,
        seq_len: 16,
        shared_weights: true,
    }
}

/// Value of the `i`-th patterned weight, in `[-0.5, 0.5)`.
pub fn pattern_value(i: usize) -> f32 {
    ((i * 37 + 11) % 101) as f32 / 101.0 - 0.5
}

/// Tensor area for `config`, in checkpoint slot order.
pub fn toy_weights(config: &ModelConfig) -> Vec<f32> {
    let (dim, hidden, layers) = (config.dim, config.hidden_dim, config.n_layers);
    let mut data = Vec::new();
    let mut next = 0usize;
    let mut patterned = |data: &mut Vec<f32>, count: usize| {
        data.extend((next..next + count).map(pattern_value));
        next += count;
    };

    patterned(&mut data, config.vocab_size * dim);
    data.extend(std::iter::repeat(1.0).take(layers * dim));
    patterned(&mut data, 4 * layers * dim * dim);
    data.extend(std::iter::repeat(1.0).take(layers * dim));
    patterned(&mut data, 3 * layers * hidden * dim);
    data.extend(std::iter::repeat(1.0).take(dim));

    let (cos, sin) = frequency_tables(config.seq_len, config.head_size(), TOY_ROPE_THETA);
    data.extend(cos.iter().copied());
    data.extend(sin.iter().copied());

    if !config.shared_weights {
        patterned(&mut data, config.vocab_size * dim);
    }
    data
}

/// Header followed by little-endian tensor data.
pub fn checkpoint_bytes(config: &ModelConfig, weights: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(config.to_header().len() + weights.len() * 4);
    bytes.extend_from_slice(&config.to_header());
    for value in weights {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn toy_checkpoint_bytes(config: &ModelConfig) -> Vec<u8> {
    checkpoint_bytes(config, &toy_weights(config))
}

/// Six entries matching [`toy_config`]: `<unk>`, BOS, and a tiny character set
/// with one merge (`" a"`).
pub fn toy_vocabulary() -> Vocabulary {
    let tokens = ["<unk>", "<s>", " ", "a", "b", " a"];
    let scores = [0.0, 0.0, -1.0, -1.0, -1.0, 2.0];
    Vocabulary::new(
        tokens.iter().map(|t| t.to_string()).collect(),
        scores.to_vec(),
    )
}
