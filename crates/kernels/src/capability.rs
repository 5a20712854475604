//! Device capability surface consumed by the parameter search.

use crate::config::{Configuration, MatvecProblem, Shape, ELEMENT_SIZE_BYTES};
use crate::matvec::DynMatvecKernel;
use serde::{Deserialize, Serialize};

/// Hardware limits reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub max_work_group_size: usize,
    pub local_mem_bytes: usize,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_work_group_size: 256,
            local_mem_bytes: 32 * 1024,
        }
    }
}

/// What the search engine needs to know about a kernel family on a device.
///
/// The generator only ever sees configurations that went through
/// [`CapabilityProvider::try_apply`].
pub trait CapabilityProvider {
    fn max_work_group_size(&self) -> usize;

    /// Size of the extra-parameter domain `[0, n)`.
    fn total_extra_param_variations(&self) -> usize;

    fn vector_width(&self) -> usize;

    fn max_block_height(&self) -> usize;

    /// Encode `shape` for `problem`, or `None` when the device or the kernel
    /// family cannot run it.
    fn try_apply(&self, problem: &MatvecProblem, shape: Shape) -> Option<Configuration>;
}

/// A kernel family bound to the limits of one device.
#[derive(Clone)]
pub struct DeviceCapability {
    limits: DeviceLimits,
    kernel: DynMatvecKernel,
}

impl DeviceCapability {
    pub fn new(limits: DeviceLimits, kernel: DynMatvecKernel) -> Self {
        Self { limits, kernel }
    }

    pub fn kernel(&self) -> &DynMatvecKernel {
        &self.kernel
    }
}

impl CapabilityProvider for DeviceCapability {
    fn max_work_group_size(&self) -> usize {
        self.limits.max_work_group_size
    }

    fn total_extra_param_variations(&self) -> usize {
        self.kernel.total_variations()
    }

    fn vector_width(&self) -> usize {
        self.kernel.vector_width()
    }

    fn max_block_height(&self) -> usize {
        self.kernel.max_block_height()
    }

    fn try_apply(&self, problem: &MatvecProblem, shape: Shape) -> Option<Configuration> {
        let vw = self.kernel.vector_width();
        let Shape {
            group_size: g,
            block_height: bh,
            extra_param: xp,
        } = shape;

        if g == 0 || g * g > self.limits.max_work_group_size {
            return None;
        }
        if bh < vw || bh % vw != 0 || bh > self.kernel.max_block_height() {
            return None;
        }
        if xp >= self.kernel.total_variations() {
            return None;
        }
        if problem.m % (g * bh) != 0 || problem.n % (g * vw) != 0 {
            return None;
        }
        // Each group stages one block of A per strip in local memory.
        if g * bh * vw * ELEMENT_SIZE_BYTES > self.limits.local_mem_bytes {
            return None;
        }
        if !self.kernel.supports(problem, &shape) {
            return None;
        }

        Some(Configuration {
            problem: *problem,
            shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matvec::PlainMatvec;
    use std::sync::Arc;

    fn capability() -> DeviceCapability {
        DeviceCapability::new(DeviceLimits::default(), Arc::new(PlainMatvec::new()))
    }

    #[test]
    fn accepts_shape_that_tiles_problem() {
        let problem = MatvecProblem::new(256, 256);
        let config = capability()
            .try_apply(&problem, Shape::new(16, 4, 0))
            .expect("valid shape");
        assert_eq!(config.group_size(), 16);
        assert_eq!(config.problem, problem);
    }

    #[test]
    fn rejects_oversized_group() {
        let problem = MatvecProblem::new(1024, 1024);
        assert!(capability().try_apply(&problem, Shape::new(17, 4, 0)).is_none());
    }

    #[test]
    fn rejects_block_height_off_vector_width() {
        let problem = MatvecProblem::new(256, 256);
        assert!(capability().try_apply(&problem, Shape::new(8, 6, 0)).is_none());
        assert!(capability().try_apply(&problem, Shape::new(8, 0, 0)).is_none());
    }

    #[test]
    fn rejects_rows_not_covered_by_groups() {
        let problem = MatvecProblem::new(96, 256);
        assert!(capability().try_apply(&problem, Shape::new(16, 4, 0)).is_none());
        assert!(capability().try_apply(&problem, Shape::new(8, 4, 0)).is_some());
    }

    #[test]
    fn rejects_extra_param_outside_domain() {
        let problem = MatvecProblem::new(256, 256);
        let cap = capability();
        let domain = cap.total_extra_param_variations();
        assert!(cap.try_apply(&problem, Shape::new(8, 4, domain)).is_none());
    }
}
