//! Token selection: greedy argmax, categorical sampling and top-p (nucleus) sampling.

use crate::error::Result;
use crate::rng::Prng;
use llamaforge_kernels::softmax_inplace;
use serde::{Deserialize, Serialize};

pub use llamaforge_kernels::argmax;

/// Samples an index from `probabilities`, which must sum to 1.
///
/// Falls back to the last index when rounding leaves the cumulative sum
/// below the draw.
pub fn sample(probabilities: &[f32], rng: &mut Prng) -> usize {
    let r = rng.next_f32();
    let mut cdf = 0.0f32;
    for (i, &p) in probabilities.iter().enumerate() {
        cdf += p;
        if r < cdf {
            return i;
        }
    }
    probabilities.len() - 1
}

/// Max-heap ordering by probability. Equal probabilities keep the lower index on top.
#[inline]
fn ranks_above(probabilities: &[f32], a: usize, b: usize) -> bool {
    let (pa, pb) = (probabilities[a], probabilities[b]);
    pa > pb || (pa == pb && a < b)
}

fn sift_down(heap: &mut [usize], mut node: usize, probabilities: &[f32]) {
    let len = heap.len();
    loop {
        let left = 2 * node + 1;
        if left >= len {
            break;
        }
        let right = left + 1;
        let mut child = left;
        if right < len && ranks_above(probabilities, heap[right], heap[left]) {
            child = right;
        }
        if ranks_above(probabilities, heap[child], heap[node]) {
            heap.swap(node, child);
            node = child;
        } else {
            break;
        }
    }
}

/// Top-p sampling: draws from the smallest set of most likely indices whose
/// mass exceeds `topp`.
///
/// `indices` is scratch of the same length as `probabilities`; it is reset to
/// the identity permutation on every call, then heap-ordered in place so the
/// nucleus ends up at its tail, largest first from the back.
pub fn sample_topp(
    probabilities: &[f32],
    topp: f32,
    indices: &mut [usize],
    rng: &mut Prng,
) -> usize {
    let n = probabilities.len();
    assert_eq!(indices.len(), n, "index scratch length mismatch");

    if topp >= 1.0 {
        return sample(probabilities, rng);
    }

    // A single index already exceeding topp is the whole nucleus.
    let max_index = argmax(probabilities);
    if probabilities[max_index] > topp {
        return max_index;
    }

    for (i, slot) in indices.iter_mut().enumerate() {
        *slot = i;
    }

    // Build heap O(n)
    for node in (0..n / 2).rev() {
        sift_down(indices, node, probabilities);
    }

    // Pop the maximum to the back until the popped mass exceeds topp; O(k log n).
    let mut cumulative = 0.0f32;
    let mut last = 0;
    for end in (1..n).rev() {
        indices.swap(0, end);
        cumulative += probabilities[indices[end]];
        if cumulative > topp {
            last = end;
            break;
        }
        sift_down(&mut indices[..end], 0, probabilities);
    }
    if last == 0 {
        // Heap exhausted without exceeding topp: the remaining root joins the nucleus.
        cumulative += probabilities[indices[0]];
    }

    let r = rng.next_f32() * cumulative;
    let mut cdf = 0.0f32;
    for i in (last..n).rev() {
        cdf += probabilities[indices[i]];
        if r < cdf {
            return indices[i];
        }
    }
    indices[last]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// 0 selects greedy argmax decoding.
    pub temperature: f32,
    /// Nucleus threshold; values outside `(0, 1)` sample the full distribution.
    pub topp: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            topp: 0.9,
        }
    }
}

/// Turns logits into the next token id.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplerConfig,
    rng: Prng,
}

impl Sampler {
    pub fn new(config: SamplerConfig, seed: u64) -> Result<Self> {
        Ok(Self {
            config,
            rng: Prng::new(seed)?,
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Picks the next token. `logits` is scaled and normalized in place.
    pub fn next_token(&mut self, logits: &mut [f32], indices: &mut [usize]) -> usize {
        if self.config.temperature == 0.0 {
            return argmax(logits);
        }

        for logit in logits.iter_mut() {
            *logit /= self.config.temperature;
        }
        softmax_inplace(logits);

        if self.config.topp <= 0.0 || self.config.topp >= 1.0 {
            sample(logits, &mut self.rng)
        } else {
            sample_topp(logits, self.config.topp, indices, &mut self.rng)
        }
    }
}
