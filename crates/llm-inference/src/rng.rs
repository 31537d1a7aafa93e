//! Deterministic xorshift* generator, the only source of randomness.

use crate::error::{InferenceError, Result};

const MULTIPLIER: u64 = 0x2545_F491_4F6C_DD1D;

/// xorshift* over one 64-bit word. A fixed seed and call sequence always
/// reproduce the same draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prng {
    state: u64,
}

impl Prng {
    /// Seed 0 is rejected: the recurrence never leaves the zero state.
    pub fn new(seed: u64) -> Result<Self> {
        if seed == 0 {
            return Err(InferenceError::InvalidSeed);
        }
        Ok(Self { state: seed })
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        (self.state.wrapping_mul(MULTIPLIER) >> 32) as u32
    }

    /// Uniform in `[0, 1)` from the top 24 bits of a draw.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16_777_216.0
    }
}
