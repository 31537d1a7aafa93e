//! Byte-pair encoding tokenizer over a scored vocabulary.
//!
//! Encoding seeds one token per character, then repeatedly merges the adjacent
//! pair whose concatenation is the highest-scoring vocabulary entry (leftmost
//! pair on ties) until no adjacent pair forms a vocabulary entry.

use crate::error::{InferenceError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Reserved id delimiting sequences: generation starts from it and stops on it.
pub const BOS_TOKEN: usize = 1;

#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    scores: Vec<f32>,
    max_token_length: u32,
    lookup: HashMap<String, usize>,
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                InferenceError::format(format!(
                    "vocabulary truncated reading {what} at byte {}",
                    self.offset
                ))
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_i32(&mut self, what: &str) -> Result<i32> {
        let b = self.take(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f32(&mut self, what: &str) -> Result<f32> {
        let b = self.take(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl Vocabulary {
    pub fn new(tokens: Vec<String>, scores: Vec<f32>) -> Self {
        assert_eq!(tokens.len(), scores.len(), "every token needs a score");
        let max_token_length = tokens.iter().map(|t| t.len()).max().unwrap_or(0) as u32;
        Self::with_max_length(tokens, scores, max_token_length)
    }

    fn with_max_length(tokens: Vec<String>, scores: Vec<f32>, max_token_length: u32) -> Self {
        let mut lookup = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            // Duplicate strings resolve to the lowest id.
            lookup.entry(token.clone()).or_insert(id);
        }
        Self {
            tokens,
            scores,
            max_token_length,
            lookup,
        }
    }

    /// Parses the tokenizer file: `i32 max_token_length`, then per entry
    /// `f32 score, i32 byte_len, bytes`.
    pub fn from_bytes(bytes: &[u8], vocab_size: usize) -> Result<Self> {
        let mut reader = ByteReader { bytes, offset: 0 };
        let max_token_length = reader.read_i32("max token length")?;

        // Every entry takes at least 8 bytes, which bounds the preallocation.
        let capacity = vocab_size.min(bytes.len() / 8);
        let mut tokens = Vec::with_capacity(capacity);
        let mut scores = Vec::with_capacity(capacity);
        for id in 0..vocab_size {
            scores.push(reader.read_f32("token score")?);
            let len = reader.read_i32("token length")?;
            let len = usize::try_from(len).map_err(|_| {
                InferenceError::format(format!("token {id} has negative length {len}"))
            })?;
            let raw = reader.take(len, "token bytes")?;
            tokens.push(String::from_utf8_lossy(raw).into_owned());
        }

        debug!(
            vocab_size,
            max_token_length,
            trailing = bytes.len() - reader.offset,
            "loaded vocabulary"
        );
        Ok(Self::with_max_length(
            tokens,
            scores,
            max_token_length.max(0) as u32,
        ))
    }

    /// Serializes in the tokenizer file format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.max_token_length as i32).to_le_bytes());
        for (token, score) in self.tokens.iter().zip(&self.scores) {
            out.extend_from_slice(&score.to_le_bytes());
            out.extend_from_slice(&(token.len() as i32).to_le_bytes());
            out.extend_from_slice(token.as_bytes());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn max_token_length(&self) -> u32 {
        self.max_token_length
    }

    pub fn token(&self, id: usize) -> &str {
        &self.tokens[id]
    }

    pub fn score(&self, id: usize) -> f32 {
        self.scores[id]
    }

    pub fn lookup(&self, piece: &str) -> Option<usize> {
        self.lookup.get(piece).copied()
    }

    /// Text for `next` following `prev`. A piece directly after BOS loses
    /// one leading space.
    pub fn decode(&self, prev: usize, next: usize) -> &str {
        let piece = self.token(next);
        if prev == BOS_TOKEN {
            piece.strip_prefix(' ').unwrap_or(piece)
        } else {
            piece
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        encode(text, self)
    }
}

/// Greedy BPE encoding of `text`.
pub fn encode(text: &str, vocab: &Vocabulary) -> Result<Vec<usize>> {
    let mut tokens = Vec::with_capacity(text.len());
    let mut buffer = String::with_capacity(vocab.max_token_length as usize * 2 + 4);

    for (offset, character) in text.char_indices() {
        buffer.clear();
        buffer.push(character);
        let id = vocab
            .lookup(&buffer)
            .ok_or(InferenceError::Vocabulary { character, offset })?;
        tokens.push(id);
    }

    loop {
        let mut best: Option<(f32, usize, usize)> = None;
        for (idx, pair) in tokens.windows(2).enumerate() {
            buffer.clear();
            buffer.push_str(vocab.token(pair[0]));
            buffer.push_str(vocab.token(pair[1]));
            if let Some(id) = vocab.lookup(&buffer) {
                let score = vocab.score(id);
                if best.map_or(true, |(best_score, _, _)| score > best_score) {
                    best = Some((score, id, idx));
                }
            }
        }

        let Some((_, id, idx)) = best else {
            break;
        };
        tokens[idx] = id;
        tokens.remove(idx + 1);
    }

    debug!(chars = text.chars().count(), tokens = tokens.len(), "encoded text");
    Ok(tokens)
}
