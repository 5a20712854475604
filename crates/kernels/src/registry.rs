//! Kernel registry for lookup and discovery.

use crate::matvec::{DynMatvecKernel, GeneralizedMatvec, MatvecKernel, PlainMatvec};
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct KernelRegistry {
    kernels: Vec<DynMatvecKernel>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self {
            kernels: Vec::new(),
        }
    }

    /// Both built-in families, with or without the vector attribute hint.
    pub fn with_default_kernels(vector_hint: bool) -> Self {
        let mut registry = Self::new();
        registry.register(PlainMatvec::new().with_vector_hint(vector_hint));
        registry.register(GeneralizedMatvec::new().with_vector_hint(vector_hint));
        registry
    }

    pub fn register<K>(&mut self, kernel: K)
    where
        K: MatvecKernel + 'static,
    {
        self.kernels.push(Arc::new(kernel));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.kernels.iter().map(|kernel| kernel.name()).collect()
    }

    pub fn find(&self, name: &str) -> Option<DynMatvecKernel> {
        self.kernels
            .iter()
            .find(|kernel| kernel.name() == name)
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_default_families() {
        let registry = KernelRegistry::with_default_kernels(true);
        assert_eq!(registry.names(), vec!["matvec", "gemv"]);
        assert_eq!(registry.find("gemv").map(|k| k.total_variations()), Some(8));
        assert!(registry.find("sgemm").is_none());
    }
}
