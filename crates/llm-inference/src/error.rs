//! Error types for the inference core.

use thiserror::Error;

/// Result type alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Failures surfaced by the core. None of them are retried.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Truncated or malformed checkpoint or vocabulary buffer.
    #[error("format error: {0}")]
    Format(String),

    /// A prompt character has no single-character vocabulary entry.
    #[error("vocabulary error: character {character:?} at offset {offset} has no vocabulary entry")]
    Vocabulary { character: char, offset: usize },

    /// The xorshift generator cannot leave the all-zero state.
    #[error("invalid seed: 0 is not a valid xorshift seed")]
    InvalidSeed,

    /// Writing generated text to the output sink failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }
}
