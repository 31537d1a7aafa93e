//! Append-only key/value cache for incremental decoding.
//!
//! Layout is `(n_layers, seq_len, dim)` for keys and values alike. Position
//! `pos` of a layer is written once, by the forward step that first reaches
//! it, and only read afterwards. Writes must arrive in position order; the
//! cache does not synchronize and relies on a single writer.

pub struct KvCache {
    keys: Vec<f32>,
    values: Vec<f32>,
    /// Positions filled so far, per layer.
    filled: Vec<usize>,
    seq_len: usize,
    dim: usize,
}

impl KvCache {
    pub fn new(n_layers: usize, seq_len: usize, dim: usize) -> Self {
        Self {
            keys: vec![0.0; n_layers * seq_len * dim],
            values: vec![0.0; n_layers * seq_len * dim],
            filled: vec![0; n_layers],
            seq_len,
            dim,
        }
    }

    fn offset(&self, layer: usize, pos: usize) -> usize {
        (layer * self.seq_len + pos) * self.dim
    }

    /// Stores the key and value of `pos` for `layer`.
    ///
    /// Panics unless `pos` is the next unfilled position of that layer.
    pub fn append(&mut self, layer: usize, pos: usize, key: &[f32], value: &[f32]) {
        assert_eq!(key.len(), self.dim, "key length mismatch");
        assert_eq!(value.len(), self.dim, "value length mismatch");
        assert!(pos < self.seq_len, "exceeded max sequence length");
        assert_eq!(
            pos, self.filled[layer],
            "cache position written out of order"
        );

        let start = self.offset(layer, pos);
        self.keys[start..start + self.dim].copy_from_slice(key);
        self.values[start..start + self.dim].copy_from_slice(value);
        self.filled[layer] += 1;
    }

    /// All positions of one layer: `(seq_len, dim)` keys and values.
    /// Only the first `len(layer)` rows hold data.
    pub fn layer(&self, layer: usize) -> (&[f32], &[f32]) {
        let start = self.offset(layer, 0);
        let end = start + self.seq_len * self.dim;
        (&self.keys[start..end], &self.values[start..end])
    }

    pub fn key(&self, layer: usize, pos: usize) -> &[f32] {
        let start = self.offset(layer, pos);
        &self.keys[start..start + self.dim]
    }

    pub fn value(&self, layer: usize, pos: usize) -> &[f32] {
        let start = self.offset(layer, pos);
        &self.values[start..start + self.dim]
    }

    pub fn len(&self, layer: usize) -> usize {
        self.filled[layer]
    }

    pub fn is_empty(&self) -> bool {
        self.filled.iter().all(|&n| n == 0)
    }

    /// Forgets every position. Stale data is overwritten by the next run.
    pub fn reset(&mut self) {
        self.filled.fill(0);
    }

    pub fn bytes_per_token(&self) -> usize {
        // 2 (K+V) * n_layers * dim * sizeof(f32)
        2 * self.filled.len() * self.dim * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_back() {
        let mut cache = KvCache::new(2, 4, 3);
        cache.append(1, 0, &[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        cache.append(1, 1, &[7.0, 8.0, 9.0], &[0.5, 0.5, 0.5]);

        assert_eq!(cache.len(1), 2);
        assert_eq!(cache.len(0), 0);
        assert_eq!(cache.key(1, 1), &[7.0, 8.0, 9.0]);
        assert_eq!(cache.value(1, 0), &[4.0, 5.0, 6.0]);

        let (keys, values) = cache.layer(1);
        assert_eq!(keys.len(), 12);
        assert_eq!(&keys[..6], &[1.0, 2.0, 3.0, 7.0, 8.0, 9.0]);
        assert_eq!(&values[3..6], &[0.5, 0.5, 0.5]);
        assert_eq!(cache.layer(0).0, &[0.0; 12]);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn rewriting_a_position_panics() {
        let mut cache = KvCache::new(1, 4, 2);
        cache.append(0, 0, &[1.0, 1.0], &[1.0, 1.0]);
        cache.append(0, 0, &[2.0, 2.0], &[2.0, 2.0]);
    }

    #[test]
    #[should_panic(expected = "exceeded max sequence length")]
    fn appending_past_capacity_panics() {
        let mut cache = KvCache::new(1, 1, 2);
        cache.append(0, 0, &[1.0, 1.0], &[1.0, 1.0]);
        cache.append(0, 1, &[1.0, 1.0], &[1.0, 1.0]);
    }

    #[test]
    fn reset_allows_a_new_run() {
        let mut cache = KvCache::new(1, 2, 2);
        cache.append(0, 0, &[1.0, 1.0], &[1.0, 1.0]);
        cache.reset();
        assert!(cache.is_empty());
        cache.append(0, 0, &[3.0, 3.0], &[3.0, 3.0]);
        assert_eq!(cache.key(0, 0), &[3.0, 3.0]);
    }

    #[test]
    fn kv_cache_bytes_per_token() {
        let cache = KvCache::new(12, 4, 768);
        // 2 * 12 layers * 768 * 4 bytes = 73728 bytes/token
        assert_eq!(cache.bytes_per_token(), 73728);
    }
}
