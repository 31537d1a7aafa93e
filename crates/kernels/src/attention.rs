//! Causal multi-head attention for a single query position over a key/value cache.

use crate::utils::softmax_inplace;
use rayon::prelude::*;

/// Shapes shared by every head of one attention call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionShape {
    pub n_heads: usize,
    pub head_size: usize,
    /// Row stride of the score buffer; at least `pos + 1`.
    pub seq_len: usize,
}

impl AttentionShape {
    pub fn dim(&self) -> usize {
        self.n_heads * self.head_size
    }
}

/// Attends the query at position `pos` to cached positions `0..=pos`.
///
/// - `query`, `out`: `(dim,)`, head `h` owns `[h * head_size, (h + 1) * head_size)`
/// - `keys`, `values`: one layer of the cache, `(seq_len, dim)` row-major
/// - `scores`: `(n_heads, seq_len)` scratch
///
/// Heads run in parallel; each writes only its own slice of `out` and `scores`.
pub fn multi_head_attention(
    out: &mut [f32],
    scores: &mut [f32],
    query: &[f32],
    keys: &[f32],
    values: &[f32],
    pos: usize,
    shape: AttentionShape,
) {
    let AttentionShape {
        n_heads,
        head_size,
        seq_len,
    } = shape;
    let dim = shape.dim();
    assert!(pos < seq_len, "position {pos} outside sequence length {seq_len}");
    assert_eq!(out.len(), dim, "attention output length mismatch");
    assert_eq!(query.len(), dim, "attention query length mismatch");
    assert_eq!(scores.len(), n_heads * seq_len, "attention score buffer mismatch");
    assert!(
        keys.len() >= (pos + 1) * dim && values.len() >= (pos + 1) * dim,
        "cache holds fewer than {} positions",
        pos + 1
    );

    let scale = (head_size as f32).sqrt();

    out.par_chunks_mut(head_size)
        .zip(scores.par_chunks_mut(seq_len))
        .enumerate()
        .for_each(|(h, (head_out, head_scores))| {
            let offset = h * head_size;
            let q = &query[offset..offset + head_size];

            for (t, score) in head_scores[..=pos].iter_mut().enumerate() {
                let k = &keys[t * dim + offset..t * dim + offset + head_size];
                let dot = q.iter().zip(k).map(|(a, b)| a * b).sum::<f32>();
                *score = dot / scale;
            }

            softmax_inplace(&mut head_scores[..=pos]);

            head_out.fill(0.0);
            for (t, &weight) in head_scores[..=pos].iter().enumerate() {
                let v = &values[t * dim + offset..t * dim + offset + head_size];
                for (o, &value) in head_out.iter_mut().zip(v) {
                    *o += weight * value;
                }
            }
        });
}
