//! Full model: embedding lookup -> decoder stack -> final norm -> classifier.

use crate::config::ModelConfig;
use crate::decoder::DecoderBlock;
use crate::rope::RopeTables;
use crate::state::InferenceState;
use crate::weights::WeightStore;
use llamaforge_kernels::{rmsnorm_inplace, DynMatvecKernel, MatvecKernel, ParallelMatvec};
use std::sync::Arc;

/// Computes the logits for `token` at `pos`, overwriting `state.logits` and
/// appending position `pos` to every layer of the cache.
///
/// Positions must be fed in order starting at 0 for a fresh (or reset) state.
pub fn forward<'s>(
    token: usize,
    pos: usize,
    config: &ModelConfig,
    weights: &WeightStore<'_>,
    state: &'s mut InferenceState,
    kernel: &dyn MatvecKernel,
) -> &'s [f32] {
    assert!(
        token < config.vocab_size,
        "token {token} outside vocabulary of {}",
        config.vocab_size
    );
    assert!(pos < config.seq_len, "position {pos} beyond seq_len {}", config.seq_len);

    state.x.copy_from_slice(weights.embedding(token, config.dim));

    let block = DecoderBlock {
        config,
        rope: RopeTables::new(weights.freq_cis_real, weights.freq_cis_imag, config.head_size()),
        kernel,
    };
    for (layer_idx, layer) in weights.layers.iter().enumerate() {
        block.forward(layer_idx, layer, pos, state);
    }

    rmsnorm_inplace(&mut state.x, weights.rms_final);
    kernel.run(&mut state.logits, &state.x, weights.classifier);
    &state.logits
}

/// A loaded model bound to the matvec kernel it runs on.
pub struct Transformer<'a> {
    config: ModelConfig,
    weights: WeightStore<'a>,
    kernel: DynMatvecKernel,
}

impl<'a> Transformer<'a> {
    pub fn new(config: ModelConfig, weights: WeightStore<'a>) -> Self {
        Self {
            config,
            weights,
            kernel: Arc::new(ParallelMatvec::new()),
        }
    }

    pub fn with_kernel(mut self, kernel: DynMatvecKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn weights(&self) -> &WeightStore<'a> {
        &self.weights
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    pub fn new_state(&self) -> InferenceState {
        InferenceState::new(&self.config)
    }

    pub fn forward<'s>(&self, token: usize, pos: usize, state: &'s mut InferenceState) -> &'s [f32] {
        forward(token, pos, &self.config, &self.weights, state, self.kernel.as_ref())
    }
}
