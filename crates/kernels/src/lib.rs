//! Numeric kernels for llamaforge.
//!
//! All kernels operate on plain `f32` slices. Shape mismatches are
//! programming errors and panic.

pub mod attention;
pub mod matmul;
pub mod norm;
pub mod registry;
pub mod utils;

pub use attention::*;
pub use matmul::*;
pub use norm::*;
pub use registry::*;
pub use utils::*;
