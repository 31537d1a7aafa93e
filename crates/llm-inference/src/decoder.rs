//! One decoder layer: RMSNorm -> attention with KV-cache -> RMSNorm -> SwiGLU feed-forward.

use crate::config::ModelConfig;
use crate::rope::RopeTables;
use crate::state::InferenceState;
use crate::weights::LayerWeights;
use llamaforge_kernels::{accum, multi_head_attention, rmsnorm, silu_gate, AttentionShape, MatvecKernel};

pub(crate) struct DecoderBlock<'a> {
    pub config: &'a ModelConfig,
    pub rope: RopeTables<'a>,
    pub kernel: &'a dyn MatvecKernel,
}

impl DecoderBlock<'_> {
    /// Runs layer `layer_idx` for the token at `pos`, updating `state.x` in
    /// place and appending this position's key/value to the cache.
    pub fn forward(
        &self,
        layer_idx: usize,
        weights: &LayerWeights<'_>,
        pos: usize,
        state: &mut InferenceState,
    ) {
        self.self_attention(layer_idx, weights, pos, state);
        self.feed_forward(weights, state);
    }

    fn self_attention(
        &self,
        layer_idx: usize,
        weights: &LayerWeights<'_>,
        pos: usize,
        state: &mut InferenceState,
    ) {
        rmsnorm(&mut state.xb, &state.x, weights.rms_att);

        // QKV projection
        self.kernel.run(&mut state.q, &state.xb, weights.wq);
        self.kernel.run(&mut state.k, &state.xb, weights.wk);
        self.kernel.run(&mut state.v, &state.xb, weights.wv);

        self.rope.rotate(&mut state.q, &mut state.k, pos);
        state.kv_cache.append(layer_idx, pos, &state.k, &state.v);

        let shape = AttentionShape {
            n_heads: self.config.n_heads,
            head_size: self.config.head_size(),
            seq_len: self.config.seq_len,
        };
        let (keys, values) = state.kv_cache.layer(layer_idx);
        multi_head_attention(&mut state.xb, &mut state.att, &state.q, keys, values, pos, shape);

        // Output projection + residual
        self.kernel.run(&mut state.xb2, &state.xb, weights.wo);
        accum(&mut state.x, &state.xb2);
    }

    fn feed_forward(&self, weights: &LayerWeights<'_>, state: &mut InferenceState) {
        rmsnorm(&mut state.xb, &state.x, weights.rms_ffn);

        // w2(silu(w1(x)) * w3(x))
        self.kernel.run(&mut state.hb, &state.xb, weights.w1);
        self.kernel.run(&mut state.hb2, &state.xb, weights.w3);
        silu_gate(&mut state.hb, &state.hb2);
        self.kernel.run(&mut state.xb, &state.hb, weights.w2);

        accum(&mut state.x, &state.xb);
    }
}
