//! Zero-copy weight views carved out of one contiguous checkpoint buffer.

use crate::config::ModelConfig;
use crate::error::{InferenceError, Result};
use tracing::debug;

/// Weights of a single decoder layer. All matrices are row-major `(out, in)`.
#[derive(Debug, Clone, Copy)]
pub struct LayerWeights<'a> {
    // Attention
    pub rms_att: &'a [f32], // (dim,)
    pub wq: &'a [f32],      // (dim, dim)
    pub wk: &'a [f32],      // (dim, dim)
    pub wv: &'a [f32],      // (dim, dim)
    pub wo: &'a [f32],      // (dim, dim)

    // Feed-forward
    pub rms_ffn: &'a [f32], // (dim,)
    pub w1: &'a [f32],      // (hidden_dim, dim)
    pub w2: &'a [f32],      // (dim, hidden_dim)
    pub w3: &'a [f32],      // (hidden_dim, dim)
}

#[derive(Debug, Clone)]
pub struct WeightStore<'a> {
    pub token_embedding: &'a [f32], // (vocab_size, dim)
    pub layers: Vec<LayerWeights<'a>>,
    pub rms_final: &'a [f32],     // (dim,)
    pub freq_cis_real: &'a [f32], // (seq_len, head_size / 2)
    pub freq_cis_imag: &'a [f32], // (seq_len, head_size / 2)
    /// Aliases `token_embedding` when the checkpoint shares weights.
    pub classifier: &'a [f32], // (vocab_size, dim)
}

struct Cursor<'a> {
    data: &'a [f32],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, elements: usize) -> &'a [f32] {
        let slice = &self.data[self.offset..self.offset + elements];
        self.offset += elements;
        slice
    }

    /// One tensor per layer for a slot stored contiguously across layers.
    fn take_layers(&mut self, n_layers: usize, elements: usize) -> Vec<&'a [f32]> {
        (0..n_layers).map(|_| self.take(elements)).collect()
    }
}

impl<'a> WeightStore<'a> {
    /// Number of `f32` values the checkpoint must provide after its header.
    ///
    /// Fails with `Format` when the header's dimensions overflow `usize`.
    pub fn required_elements(config: &ModelConfig) -> Result<usize> {
        Self::checked_elements(config)
            .ok_or_else(|| InferenceError::format("checkpoint dimensions overflow"))
    }

    fn checked_elements(config: &ModelConfig) -> Option<usize> {
        let dim = config.dim;
        let square = dim.checked_mul(dim)?;
        let ffn = dim.checked_mul(config.hidden_dim)?;
        let per_layer = (2 * dim)
            .checked_add(square.checked_mul(4)?)?
            .checked_add(ffn.checked_mul(3)?)?;
        let half_head = config.head_size() / 2;
        let rope_table = config.seq_len.checked_mul(half_head)?;
        let embedding = config.vocab_size.checked_mul(dim)?;
        let classifier = if config.shared_weights { 0 } else { embedding };

        embedding
            .checked_add(config.n_layers.checked_mul(per_layer)?)?
            .checked_add(dim)?
            .checked_add(rope_table.checked_mul(2)?)?
            .checked_add(classifier)
    }

    /// Slices every tensor out of `data` in checkpoint order.
    pub fn load(config: &ModelConfig, data: &'a [f32]) -> Result<Self> {
        let required = Self::required_elements(config)?;
        if data.len() < required {
            return Err(InferenceError::format(format!(
                "checkpoint holds {} weights, configuration needs {}",
                data.len(),
                required
            )));
        }

        let dim = config.dim;
        let hidden = config.hidden_dim;
        let n_layers = config.n_layers;
        let mut cursor = Cursor { data, offset: 0 };

        let token_embedding = cursor.take(config.vocab_size * dim);
        let rms_att = cursor.take_layers(n_layers, dim);
        let wq = cursor.take_layers(n_layers, dim * dim);
        let wk = cursor.take_layers(n_layers, dim * dim);
        let wv = cursor.take_layers(n_layers, dim * dim);
        let wo = cursor.take_layers(n_layers, dim * dim);
        let rms_ffn = cursor.take_layers(n_layers, dim);
        let w1 = cursor.take_layers(n_layers, hidden * dim);
        let w2 = cursor.take_layers(n_layers, dim * hidden);
        let w3 = cursor.take_layers(n_layers, hidden * dim);
        let rms_final = cursor.take(dim);
        let half_head = config.head_size() / 2;
        let freq_cis_real = cursor.take(config.seq_len * half_head);
        let freq_cis_imag = cursor.take(config.seq_len * half_head);
        let classifier = if config.shared_weights {
            token_embedding
        } else {
            cursor.take(config.vocab_size * dim)
        };

        if cursor.offset < data.len() {
            debug!(
                trailing = data.len() - cursor.offset,
                "ignoring trailing checkpoint data"
            );
        }

        let layers = (0..n_layers)
            .map(|l| LayerWeights {
                rms_att: rms_att[l],
                wq: wq[l],
                wk: wk[l],
                wv: wv[l],
                wo: wo[l],
                rms_ffn: rms_ffn[l],
                w1: w1[l],
                w2: w2[l],
                w3: w3[l],
            })
            .collect();

        debug!(elements = cursor.offset, layers = n_layers, "carved weight tensors");

        Ok(Self {
            token_embedding,
            layers,
            rms_final,
            freq_cis_real,
            freq_cis_imag,
            classifier,
        })
    }

    pub fn classifier_is_shared(&self) -> bool {
        std::ptr::eq(self.classifier, self.token_embedding)
    }

    pub fn embedding(&self, token: usize, dim: usize) -> &'a [f32] {
        &self.token_embedding[token * dim..(token + 1) * dim]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn counting_buffer(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn slots_are_carved_in_checkpoint_order() {
        let config = fixtures::toy_config();
        let data = counting_buffer(WeightStore::required_elements(&config).unwrap());
        let weights = WeightStore::load(&config, &data).unwrap();
        let (dim, hidden, vocab) = (config.dim, config.hidden_dim, config.vocab_size);

        assert_eq!(weights.token_embedding[0], 0.0);
        let after_embedding = (vocab * dim) as f32;
        assert_eq!(weights.layers[0].rms_att[0], after_embedding);
        assert_eq!(weights.layers[1].rms_att[0], after_embedding + dim as f32);
        let wq_start = after_embedding + (2 * dim) as f32;
        assert_eq!(weights.layers[0].wq[0], wq_start);
        assert_eq!(weights.layers[1].wq[0], wq_start + (dim * dim) as f32);
        assert_eq!(weights.layers[1].w3.len(), hidden * dim);
        assert_eq!(weights.freq_cis_real.len(), config.seq_len * config.head_size() / 2);
        assert_eq!(
            *weights.freq_cis_imag.last().unwrap(),
            (data.len() - 1) as f32
        );
    }

    #[test]
    fn shared_classifier_aliases_embedding() {
        let config = fixtures::toy_config();
        assert!(config.shared_weights);
        let data = counting_buffer(WeightStore::required_elements(&config).unwrap());
        let weights = WeightStore::load(&config, &data).unwrap();
        assert!(weights.classifier_is_shared());
        assert_eq!(weights.classifier.as_ptr(), weights.token_embedding.as_ptr());
    }

    #[test]
    fn unshared_classifier_comes_from_the_tail() {
        let config = ModelConfig {
            shared_weights: false,
            ..fixtures::toy_config()
        };
        let data = counting_buffer(WeightStore::required_elements(&config).unwrap());
        let weights = WeightStore::load(&config, &data).unwrap();
        assert!(!weights.classifier_is_shared());
        assert_eq!(weights.classifier.len(), config.vocab_size * config.dim);
        assert_eq!(*weights.classifier.last().unwrap(), (data.len() - 1) as f32);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let config = fixtures::toy_config();
        let data = counting_buffer(WeightStore::required_elements(&config).unwrap() - 1);
        let err = WeightStore::load(&config, &data).unwrap_err();
        assert!(matches!(err, InferenceError::Format(_)));
    }

    #[test]
    fn overflowing_dimensions_are_a_format_error() {
        let config = ModelConfig {
            dim: 1 << 30,
            hidden_dim: i32::MAX as usize,
            n_layers: 2,
            n_heads: 1 << 29,
            n_kv_heads: 1 << 29,
            vocab_size: 32000,
            seq_len: 2048,
            shared_weights: true,
        };
        assert!(matches!(
            WeightStore::required_elements(&config),
            Err(InferenceError::Format(_))
        ));
        let err = WeightStore::load(&config, &[0.0; 16]).unwrap_err();
        assert!(matches!(err, InferenceError::Format(_)));
    }

    #[test]
    fn views_borrow_the_backing_buffer() {
        let config = fixtures::toy_config();
        let data = counting_buffer(WeightStore::required_elements(&config).unwrap() + 5);
        let weights = WeightStore::load(&config, &data).unwrap();
        let range = data.as_ptr_range();
        assert!(range.contains(&weights.layers[1].w2.as_ptr()));
        assert!(range.contains(&weights.rms_final.as_ptr()));
    }
}
