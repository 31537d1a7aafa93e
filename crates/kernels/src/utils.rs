//! Elementwise helpers shared by the forward pass and the samplers.

/// Numerically stabilized softmax, in place over the whole slice.
///
/// Callers softmax a sub-range of a larger buffer by slicing it first.
pub fn softmax_inplace(x: &mut [f32]) {
    if x.is_empty() {
        return;
    }
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in x.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in x.iter_mut() {
        *v /= sum;
    }
}

/// Residual connection: `a += b`.
pub fn accum(a: &mut [f32], b: &[f32]) {
    assert_eq!(a.len(), b.len(), "accum length mismatch");
    for (x, &y) in a.iter_mut().zip(b) {
        *x += y;
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// SwiGLU gate: `gate[i] = silu(gate[i]) * up[i]`.
pub fn silu_gate(gate: &mut [f32], up: &[f32]) {
    assert_eq!(gate.len(), up.len(), "gate length mismatch");
    for (g, &u) in gate.iter_mut().zip(up) {
        *g *= sigmoid(*g);
        *g *= u;
    }
}

/// Index of the largest value; the first occurrence wins ties.
pub fn argmax(x: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in x.iter().enumerate().skip(1) {
        if v > x[best] {
            best = i;
        }
    }
    best
}
