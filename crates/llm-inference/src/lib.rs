//! Single-sequence Llama-2 inference on the CPU.
//!
//! This crate implements:
//! - Checkpoint parsing with zero-copy weight views
//! - Forward pass with RoPE attention over an append-only KV-cache
//! - Greedy BPE tokenizer
//! - Argmax, categorical and top-p sampling driven by a seeded xorshift generator
//! - A generation loop streaming decoded text

pub mod checkpoint;
pub mod config;
mod decoder;
pub mod error;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod generate;
pub mod kv_cache;
pub mod model;
pub mod rng;
pub mod rope;
pub mod sampler;
pub mod state;
pub mod tokenizer;
pub mod weights;

pub use checkpoint::Checkpoint;
pub use config::ModelConfig;
pub use error::{InferenceError, Result};
pub use generate::{GenerationMetrics, GenerationOutput, Generator};
pub use kv_cache::KvCache;
pub use model::{forward, Transformer};
pub use rng::Prng;
pub use sampler::{argmax, sample, sample_topp, Sampler, SamplerConfig};
pub use state::InferenceState;
pub use tokenizer::{encode, Vocabulary, BOS_TOKEN};
pub use weights::{LayerWeights, WeightStore};
