//! Model configuration parsed from the checkpoint header.

use crate::error::{InferenceError, Result};
use serde::{Deserialize, Serialize};

/// Number of bytes in the checkpoint header: seven little-endian `i32`.
pub const HEADER_BYTES: usize = 7 * 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub vocab_size: usize,
    pub seq_len: usize,
    /// Classifier reuses the token embedding table. Encoded in the header by
    /// the sign of `vocab_size`.
    pub shared_weights: bool,
}

impl ModelConfig {
    /// Parses and validates the 28-byte header at the start of `bytes`.
    pub fn from_header(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_BYTES {
            return Err(InferenceError::format(format!(
                "checkpoint header needs {HEADER_BYTES} bytes, got {}",
                bytes.len()
            )));
        }

        let mut fields = [0i32; 7];
        for (field, chunk) in fields.iter_mut().zip(bytes[..HEADER_BYTES].chunks_exact(4)) {
            *field = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let [dim, hidden_dim, n_layers, n_heads, n_kv_heads, vocab_size, seq_len] = fields;

        let config = Self {
            dim: positive("dim", dim)?,
            hidden_dim: positive("hidden_dim", hidden_dim)?,
            n_layers: positive("n_layers", n_layers)?,
            n_heads: positive("n_heads", n_heads)?,
            n_kv_heads: positive("n_kv_heads", n_kv_heads)?,
            vocab_size: positive("vocab_size", vocab_size.saturating_abs())?,
            seq_len: positive("seq_len", seq_len)?,
            shared_weights: vocab_size > 0,
        };
        config.validate()?;
        Ok(config)
    }

    /// Serializes the header, encoding `shared_weights` in the sign of `vocab_size`.
    pub fn to_header(&self) -> [u8; HEADER_BYTES] {
        let vocab_size = if self.shared_weights {
            self.vocab_size as i32
        } else {
            -(self.vocab_size as i32)
        };
        let fields = [
            self.dim as i32,
            self.hidden_dim as i32,
            self.n_layers as i32,
            self.n_heads as i32,
            self.n_kv_heads as i32,
            vocab_size,
            self.seq_len as i32,
        ];
        let mut header = [0u8; HEADER_BYTES];
        for (chunk, field) in header.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        header
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim % self.n_heads != 0 {
            return Err(InferenceError::format(format!(
                "dim {} is not divisible by n_heads {}",
                self.dim, self.n_heads
            )));
        }
        if self.head_size() % 2 != 0 {
            return Err(InferenceError::format(format!(
                "head size {} must be even for rotary embeddings",
                self.head_size()
            )));
        }
        if self.n_kv_heads != self.n_heads {
            return Err(InferenceError::format(format!(
                "n_kv_heads {} differs from n_heads {}; grouped key/value heads are not supported",
                self.n_kv_heads, self.n_heads
            )));
        }
        Ok(())
    }

    pub fn head_size(&self) -> usize {
        self.dim / self.n_heads
    }

    /// Key plus value cache footprint of one position across all layers.
    pub fn kv_bytes_per_token(&self) -> usize {
        2 * self.n_layers * self.dim * std::mem::size_of::<f32>()
    }
}

fn positive(name: &str, value: i32) -> Result<usize> {
    if value <= 0 {
        return Err(InferenceError::format(format!(
            "header field {name} must be positive, got {value}"
        )));
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stories15m() -> ModelConfig {
        ModelConfig {
            dim: 288,
            hidden_dim: 768,
            n_layers: 6,
            n_heads: 6,
            n_kv_heads: 6,
            vocab_size: 32000,
            seq_len: 256,
            shared_weights: true,
        }
    }

    #[test]
    fn header_round_trip_preserves_sharing_flag() {
        let config = stories15m();
        assert_eq!(ModelConfig::from_header(&config.to_header()).unwrap(), config);

        let unshared = ModelConfig {
            shared_weights: false,
            ..stories15m()
        };
        let header = unshared.to_header();
        assert_eq!(i32::from_le_bytes(header[20..24].try_into().unwrap()), -32000);
        let parsed = ModelConfig::from_header(&header).unwrap();
        assert_eq!(parsed.vocab_size, 32000);
        assert!(!parsed.shared_weights);
    }

    #[test]
    fn derived_sizes() {
        let config = stories15m();
        assert_eq!(config.head_size(), 48);
        // 2 (K+V) * 6 layers * 288 * 4 bytes
        assert_eq!(config.kv_bytes_per_token(), 13824);
    }

    #[test]
    fn short_header_is_a_format_error() {
        let err = ModelConfig::from_header(&[0u8; 27]).unwrap_err();
        assert!(matches!(err, InferenceError::Format(_)));
    }

    #[test]
    fn rejects_inconsistent_dimensions() {
        let indivisible = ModelConfig {
            n_heads: 5,
            n_kv_heads: 5,
            ..stories15m()
        };
        assert!(ModelConfig::from_header(&indivisible.to_header()).is_err());

        let grouped = ModelConfig {
            n_kv_heads: 2,
            ..stories15m()
        };
        assert!(ModelConfig::from_header(&grouped.to_header()).is_err());

        let mut header = stories15m().to_header();
        header[8..12].copy_from_slice(&0i32.to_le_bytes());
        assert!(ModelConfig::from_header(&header).is_err());
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_value(stories15m()).unwrap();
        assert_eq!(json["dim"], 288);
        assert_eq!(json["shared_weights"], true);
    }
}
