//! Autoregressive generation loop: prompt forcing, sampling and text streaming.

use crate::error::Result;
use crate::model::Transformer;
use crate::sampler::Sampler;
use crate::state::InferenceState;
use crate::tokenizer::{Vocabulary, BOS_TOKEN};
use serde::Serialize;
use std::io::Write;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationMetrics {
    /// Forward steps executed, including prompt positions.
    pub positions: usize,
    pub tokens_generated: usize,
    /// Wall time after the first step, which is excluded as warm-up.
    pub elapsed_ms: f64,
    pub tokens_per_sec: f64,
    pub kv_cache_bytes_per_token: usize,
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Every id emitted after BOS: forced prompt tokens, then sampled ones.
    pub tokens: Vec<usize>,
    pub metrics: GenerationMetrics,
}

/// Drives one sequence at a time through a model.
pub struct Generator<'a> {
    model: &'a Transformer<'a>,
    vocab: &'a Vocabulary,
    sampler: Sampler,
    state: InferenceState,
}

impl<'a> Generator<'a> {
    pub fn new(model: &'a Transformer<'a>, vocab: &'a Vocabulary, sampler: Sampler) -> Self {
        let state = model.new_state();
        Self {
            model,
            vocab,
            sampler,
            state,
        }
    }

    pub fn state(&self) -> &InferenceState {
        &self.state
    }

    /// Runs up to `steps` positions (0 or anything beyond `seq_len` means
    /// `seq_len`), streaming decoded text into `sink`.
    ///
    /// Starts from BOS at position 0. While the prompt lasts its tokens are
    /// forced; afterwards the sampler picks. Stops early when BOS is produced.
    pub fn generate<W: Write>(
        &mut self,
        prompt: Option<&str>,
        steps: usize,
        sink: &mut W,
    ) -> Result<GenerationOutput> {
        let seq_len = self.model.config().seq_len;
        let steps = if steps == 0 || steps > seq_len {
            seq_len
        } else {
            steps
        };

        let prompt_tokens = match prompt {
            Some(text) => self.vocab.encode(text)?,
            None => Vec::new(),
        };
        info!(
            prompt_tokens = prompt_tokens.len(),
            steps,
            kernel = self.model.kernel_name(),
            "starting generation"
        );

        self.state.reset();
        let mut tokens = Vec::with_capacity(steps);
        let mut token = BOS_TOKEN;
        let mut pos = 0;
        let mut start: Option<Instant> = None;

        while pos < steps {
            self.model.forward(token, pos, &mut self.state);

            let next = if pos < prompt_tokens.len() {
                prompt_tokens[pos]
            } else {
                self.sampler
                    .next_token(&mut self.state.logits, &mut self.state.indices)
            };
            pos += 1;

            if next == BOS_TOKEN {
                break;
            }

            sink.write_all(self.vocab.decode(token, next).as_bytes())?;
            sink.flush()?;
            tokens.push(next);
            token = next;

            // The first step is slower; time from here.
            if start.is_none() {
                start = Some(Instant::now());
            }
        }

        let elapsed = start.map(|s| s.elapsed()).unwrap_or_default();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let tokens_per_sec = if pos > 1 && elapsed_ms > 0.0 {
            (pos - 1) as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let metrics = GenerationMetrics {
            positions: pos,
            tokens_generated: tokens.len(),
            elapsed_ms,
            tokens_per_sec,
            kv_cache_bytes_per_token: self.model.config().kv_bytes_per_token(),
        };
        info!(
            positions = metrics.positions,
            tokens = metrics.tokens_generated,
            tokens_per_sec = metrics.tokens_per_sec,
            "generation finished"
        );

        Ok(GenerationOutput { tokens, metrics })
    }
}
