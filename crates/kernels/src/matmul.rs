//! Matrix-vector multiplication kernels.
//!
//! Every kernel computes `out = W @ x` for a row-major `W` of shape `(d, n)`.
//! Each output row is an independent dot product evaluated with the same
//! arithmetic in every kernel, so results do not depend on how rows are
//! scheduled across threads.

use ndarray::ArrayView1;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;

pub trait MatvecKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// `out (d,) = w (d, n) @ x (n,)`. Panics when the shapes disagree.
    fn run(&self, out: &mut [f32], x: &[f32], w: &[f32]);
}

pub type DynMatvecKernel = Arc<dyn MatvecKernel>;

pub fn validate_matvec_inputs(out: &[f32], x: &[f32], w: &[f32]) {
    assert_eq!(
        w.len(),
        out.len() * x.len(),
        "matvec dimension mismatch: weight has {} elements, expected {}x{}",
        w.len(),
        out.len(),
        x.len()
    );
}

#[inline]
fn row_dot(row: &[f32], x: &[f32]) -> f32 {
    ArrayView1::from(row).dot(&ArrayView1::from(x))
}

/// Single-threaded kernel, used as ground truth.
#[derive(Default)]
pub struct ReferenceMatvec;

impl ReferenceMatvec {
    pub fn new() -> Self {
        Self
    }
}

impl MatvecKernel for ReferenceMatvec {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn run(&self, out: &mut [f32], x: &[f32], w: &[f32]) {
        validate_matvec_inputs(out, x, w);
        if x.is_empty() {
            out.fill(0.0);
            return;
        }
        for (value, row) in out.iter_mut().zip(w.chunks_exact(x.len())) {
            *value = row_dot(row, x);
        }
    }
}

/// Row-parallel kernel. Runs on the global rayon pool unless built with an
/// explicit thread count.
#[derive(Default)]
pub struct ParallelMatvec {
    pool: Option<ThreadPool>,
}

impl ParallelMatvec {
    pub fn new() -> Self {
        Self { pool: None }
    }

    pub fn with_threads(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(ThreadPool::current_num_threads)
            .unwrap_or_else(rayon::current_num_threads)
    }

    fn run_rows(out: &mut [f32], x: &[f32], w: &[f32]) {
        let n = x.len();
        out.par_iter_mut().enumerate().for_each(|(row_idx, value)| {
            *value = row_dot(&w[row_idx * n..(row_idx + 1) * n], x);
        });
    }
}

impl MatvecKernel for ParallelMatvec {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn run(&self, out: &mut [f32], x: &[f32], w: &[f32]) {
        validate_matvec_inputs(out, x, w);
        match &self.pool {
            Some(pool) => pool.install(|| Self::run_rows(out, x, w)),
            None => Self::run_rows(out, x, w),
        }
    }
}
