//! Problem and configuration structures.

use serde::{Deserialize, Serialize};

/// Bytes per matrix element; every kernel family computes in `f32`.
pub const ELEMENT_SIZE_BYTES: usize = 4;

/// A matrix-vector product `y = A·x` with `A` of logical shape `m × n`.
///
/// With `transpose` set, `A` is stored column-major (an `n × m` array).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatvecProblem {
    pub m: usize,
    pub n: usize,
    pub transpose: bool,
}

impl MatvecProblem {
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            m,
            n,
            transpose: false,
        }
    }

    pub fn with_transpose(mut self, transpose: bool) -> Self {
        self.transpose = transpose;
        self
    }

    pub fn flops(&self) -> f64 {
        2.0 * self.m as f64 * self.n as f64
    }

    /// Storage shape of the matrix operand.
    pub fn matrix_dims(&self) -> (usize, usize) {
        if self.transpose {
            (self.n, self.m)
        } else {
            (self.m, self.n)
        }
    }
}

/// The tunable part of a kernel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Shape {
    /// Work-group width; a group runs `group_size²` work items.
    pub group_size: usize,
    /// Output rows computed by each work item.
    pub block_height: usize,
    /// Kernel-family specific variant index.
    pub extra_param: usize,
}

impl Shape {
    pub fn new(group_size: usize, block_height: usize, extra_param: usize) -> Self {
        Self {
            group_size,
            block_height,
            extra_param,
        }
    }
}

/// A fully encoded kernel configuration. Only produced by a capability
/// provider once the shape has been checked against the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Configuration {
    pub problem: MatvecProblem,
    pub shape: Shape,
}

impl Configuration {
    pub fn group_size(&self) -> usize {
        self.shape.group_size
    }

    pub fn block_height(&self) -> usize {
        self.shape.block_height
    }

    pub fn extra_param(&self) -> usize {
        self.shape.extra_param
    }
}

/// Which shape dimensions the caller fixed. `None` means free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapePins {
    pub group_size: Option<usize>,
    pub block_height: Option<usize>,
    pub extra_param: Option<usize>,
}

impl ShapePins {
    pub fn free() -> Self {
        Self::default()
    }

    /// Pin only the extra parameter; group size and block height stay free.
    pub fn extra_param(extra_param: usize) -> Self {
        Self {
            extra_param: Some(extra_param),
            ..Self::default()
        }
    }

    /// Pin group size and block height; the extra parameter stays free.
    pub fn shape(group_size: usize, block_height: usize) -> Self {
        Self {
            group_size: Some(group_size),
            block_height: Some(block_height),
            extra_param: None,
        }
    }

    pub fn all(shape: Shape) -> Self {
        Self {
            group_size: Some(shape.group_size),
            block_height: Some(shape.block_height),
            extra_param: Some(shape.extra_param),
        }
    }

    pub fn is_free(&self) -> bool {
        self.group_size.is_none() && self.block_height.is_none() && self.extra_param.is_none()
    }
}
