//! Checkpoint buffer: header plus a flat little-endian `f32` tensor area.

use crate::config::{ModelConfig, HEADER_BYTES};
use crate::error::Result;
use crate::weights::WeightStore;
use std::borrow::Cow;
use tracing::{debug, info};

/// A parsed checkpoint borrowing its tensor data from the caller's buffer.
///
/// The tensor area is reinterpreted in place when the buffer is suitably
/// aligned (memory maps always are); otherwise it is decoded once into an
/// owned buffer.
#[derive(Debug)]
pub struct Checkpoint<'a> {
    config: ModelConfig,
    data: Cow<'a, [f32]>,
}

impl<'a> Checkpoint<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let config = ModelConfig::from_header(bytes)?;
        info!(
            dim = config.dim,
            hidden_dim = config.hidden_dim,
            n_layers = config.n_layers,
            n_heads = config.n_heads,
            vocab_size = config.vocab_size,
            seq_len = config.seq_len,
            shared_weights = config.shared_weights,
            "parsed checkpoint header"
        );

        let body = &bytes[HEADER_BYTES..];
        let body = &body[..body.len() / 4 * 4];

        let borrowed = if cfg!(target_endian = "little") {
            bytemuck::try_cast_slice::<u8, f32>(body).ok()
        } else {
            None
        };
        let data = match borrowed {
            Some(floats) => Cow::Borrowed(floats),
            None => {
                debug!(bytes = body.len(), "tensor area not f32-aligned; decoding a copy");
                Cow::Owned(
                    body.chunks_exact(4)
                        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                        .collect(),
                )
            }
        };

        Ok(Self { config, data })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn is_zero_copy(&self) -> bool {
        matches!(self.data, Cow::Borrowed(_))
    }

    /// Carves the weight tensors out of the tensor area.
    pub fn weights(&self) -> Result<WeightStore<'_>> {
        WeightStore::load(&self.config, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::fixtures;

    #[test]
    fn parses_fixture_checkpoint() {
        let config = fixtures::toy_config();
        let bytes = fixtures::toy_checkpoint_bytes(&config);
        let checkpoint = Checkpoint::from_bytes(&bytes).unwrap();
        assert_eq!(checkpoint.config(), &config);
        assert_eq!(
            checkpoint.data().len(),
            WeightStore::required_elements(&config).unwrap()
        );
        let weights = checkpoint.weights().unwrap();
        assert_eq!(weights.token_embedding.len(), config.vocab_size * config.dim);
    }

    #[test]
    fn misaligned_buffer_decodes_identical_values() {
        let config = fixtures::toy_config();
        let bytes = fixtures::toy_checkpoint_bytes(&config);
        let mut shifted = vec![0u8; bytes.len() + 1];
        shifted[1..].copy_from_slice(&bytes);

        let aligned = Checkpoint::from_bytes(&bytes).unwrap();
        let unaligned = Checkpoint::from_bytes(&shifted[1..]).unwrap();
        assert_eq!(aligned.data(), unaligned.data());
    }

    #[test]
    fn truncated_tensor_area_fails_to_load() {
        let config = fixtures::toy_config();
        let bytes = fixtures::toy_checkpoint_bytes(&config);
        let checkpoint = Checkpoint::from_bytes(&bytes[..bytes.len() - 8]).unwrap();
        assert!(matches!(checkpoint.weights(), Err(InferenceError::Format(_))));
    }

    #[test]
    fn oversized_header_fails_to_load_instead_of_panicking() {
        let header = ModelConfig {
            dim: 1 << 30,
            hidden_dim: i32::MAX as usize,
            n_layers: 2,
            n_heads: 1 << 29,
            n_kv_heads: 1 << 29,
            vocab_size: 32000,
            seq_len: 2048,
            shared_weights: true,
        }
        .to_header();
        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);

        let checkpoint = Checkpoint::from_bytes(&bytes).unwrap();
        assert!(matches!(checkpoint.weights(), Err(InferenceError::Format(_))));
    }
}
