//! Rotary Position Embeddings (RoPE) as used in LLaMA.
//!
//! Reference: https://arxiv.org/abs/2104.09864

use ndarray::Array2;

/// Precomputed rotation tables borrowed from the checkpoint.
/// Both tables are `(seq_len, head_size / 2)`.
#[derive(Debug, Clone, Copy)]
pub struct RopeTables<'a> {
    cos: &'a [f32],
    sin: &'a [f32],
    head_size: usize,
}

impl<'a> RopeTables<'a> {
    pub fn new(cos: &'a [f32], sin: &'a [f32], head_size: usize) -> Self {
        assert_eq!(cos.len(), sin.len(), "rope tables differ in length");
        assert!(head_size % 2 == 0, "head size must be even");
        Self { cos, sin, head_size }
    }

    pub fn max_positions(&self) -> usize {
        self.cos.len() / (self.head_size / 2)
    }

    /// Rotates every `(x[i], x[i + 1])` pair of `q` and `k` in place by the
    /// angle for `pos` and the pair's index within its head.
    pub fn rotate(&self, q: &mut [f32], k: &mut [f32], pos: usize) {
        assert_eq!(q.len(), k.len(), "query and key lengths differ");
        assert!(pos < self.max_positions(), "position {pos} beyond rope table");

        let half = self.head_size / 2;
        let row = pos * half;
        for i in (0..q.len()).step_by(2) {
            let j = row + (i % self.head_size) / 2;
            let (fcr, fci) = (self.cos[j], self.sin[j]);

            let (q0, q1) = (q[i], q[i + 1]);
            q[i] = q0 * fcr - q1 * fci;
            q[i + 1] = q0 * fci + q1 * fcr;

            let (k0, k1) = (k[i], k[i + 1]);
            k[i] = k0 * fcr - k1 * fci;
            k[i + 1] = k0 * fci + k1 * fcr;
        }
    }
}

/// Builds `(cos, sin)` tables of shape `(seq_len, head_size / 2)` with
/// `angle = pos * theta^(-2j / head_size)`, the layout checkpoints store.
pub fn frequency_tables(seq_len: usize, head_size: usize, theta: f32) -> (Array2<f32>, Array2<f32>) {
    let half = head_size / 2;
    let mut cos = Array2::<f32>::zeros((seq_len, half));
    let mut sin = Array2::<f32>::zeros((seq_len, half));

    for pos in 0..seq_len {
        for j in 0..half {
            let freq = 1.0 / theta.powf((2 * j) as f32 / head_size as f32);
            let angle = pos as f32 * freq;
            cos[[pos, j]] = angle.cos();
            sin[[pos, j]] = angle.sin();
        }
    }

    (cos, sin)
}
