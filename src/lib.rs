//! llamaforge: single-sequence CPU inference for Llama-2 style checkpoints.

pub use llamaforge_kernels as kernels;
pub use llamaforge_llm as llm;
