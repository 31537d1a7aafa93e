//! Mutable per-run buffers reused by every forward step.

use crate::config::ModelConfig;
use crate::kv_cache::KvCache;

/// Scratch activations, the key/value cache and the sampler's index scratch.
///
/// Sized once from the configuration; no step allocates. A step must finish
/// before the next one starts: an interrupted step leaves the buffers
/// inconsistent, so the state is owned by one caller and passed by `&mut`.
pub struct InferenceState {
    /// Activation at the current position. (dim,)
    pub x: Vec<f32>,
    /// Activation inside a residual branch. (dim,)
    pub xb: Vec<f32>,
    /// Attention output projection. (dim,)
    pub xb2: Vec<f32>,
    /// Feed-forward hidden buffers. (hidden_dim,)
    pub hb: Vec<f32>,
    pub hb2: Vec<f32>,
    pub q: Vec<f32>,
    pub k: Vec<f32>,
    pub v: Vec<f32>,
    /// Attention scores. (n_heads, seq_len)
    pub att: Vec<f32>,
    /// Output of the last forward step. (vocab_size,)
    pub logits: Vec<f32>,
    pub kv_cache: KvCache,
    /// Index permutation used by nucleus sampling. (vocab_size,)
    pub indices: Vec<usize>,
}

impl InferenceState {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            x: vec![0.0; config.dim],
            xb: vec![0.0; config.dim],
            xb2: vec![0.0; config.dim],
            hb: vec![0.0; config.hidden_dim],
            hb2: vec![0.0; config.hidden_dim],
            q: vec![0.0; config.dim],
            k: vec![0.0; config.dim],
            v: vec![0.0; config.dim],
            att: vec![0.0; config.n_heads * config.seq_len],
            logits: vec![0.0; config.vocab_size],
            kv_cache: KvCache::new(config.n_layers, config.seq_len, config.dim),
            indices: (0..config.vocab_size).collect(),
        }
    }

    pub fn logits(&self) -> &[f32] {
        &self.logits
    }

    /// Number of positions already processed.
    pub fn position(&self) -> usize {
        self.kv_cache.len(0)
    }

    /// Prepares the state for a new sequence.
    pub fn reset(&mut self) {
        self.kv_cache.reset();
    }
}
