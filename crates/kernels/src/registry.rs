//! Kernel registry for lookup and discovery.

use crate::matmul::{DynMatvecKernel, MatvecKernel, ParallelMatvec, ReferenceMatvec};
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct KernelRegistry {
    matvec_kernels: Vec<DynMatvecKernel>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self {
            matvec_kernels: Vec::new(),
        }
    }

    pub fn with_default_kernels() -> Self {
        let mut registry = Self::new();
        registry.register(ReferenceMatvec::new());
        registry.register(ParallelMatvec::new());
        registry
    }

    pub fn register<K>(&mut self, kernel: K)
    where
        K: MatvecKernel + 'static,
    {
        self.register_shared(Arc::new(kernel));
    }

    /// Registers an already shared kernel, replacing any kernel with the same name.
    pub fn register_shared(&mut self, kernel: DynMatvecKernel) {
        self.matvec_kernels
            .retain(|existing| existing.name() != kernel.name());
        self.matvec_kernels.push(kernel);
    }

    pub fn kernels(&self) -> &[DynMatvecKernel] {
        &self.matvec_kernels
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.matvec_kernels.iter().map(|kernel| kernel.name()).collect()
    }

    pub fn find(&self, name: &str) -> Option<DynMatvecKernel> {
        self.matvec_kernels
            .iter()
            .find(|kernel| kernel.name() == name)
            .map(Arc::clone)
    }
}
