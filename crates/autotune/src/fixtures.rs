//! Synthetic capability and oracle used by unit tests.

use crate::oracle::{BusTransfer, Measurement, MeasurementOracle, OracleError};
use gemvtune_kernels::capability::CapabilityProvider;
use gemvtune_kernels::config::{Configuration, MatvecProblem, Shape};

type ShapeFilter = Box<dyn Fn(&Shape) -> bool>;

/// Accepts any shape on the vector-width grid unless a filter rejects it.
pub struct GridCapability {
    pub max_work_group_size: usize,
    pub vector_width: usize,
    pub max_block_height: usize,
    pub variations: usize,
    reject: Option<ShapeFilter>,
}

impl GridCapability {
    pub fn permissive() -> Self {
        Self {
            max_work_group_size: 256,
            vector_width: 4,
            max_block_height: 16,
            variations: 3,
            reject: None,
        }
    }

    pub fn rejecting(mut self, filter: impl Fn(&Shape) -> bool + 'static) -> Self {
        self.reject = Some(Box::new(filter));
        self
    }

    pub fn with_max_work_group_size(mut self, max: usize) -> Self {
        self.max_work_group_size = max;
        self
    }

    pub fn with_variations(mut self, variations: usize) -> Self {
        self.variations = variations;
        self
    }
}

impl CapabilityProvider for GridCapability {
    fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    fn total_extra_param_variations(&self) -> usize {
        self.variations
    }

    fn vector_width(&self) -> usize {
        self.vector_width
    }

    fn max_block_height(&self) -> usize {
        self.max_block_height
    }

    fn try_apply(&self, problem: &MatvecProblem, shape: Shape) -> Option<Configuration> {
        let on_grid = shape.group_size > 0
            && shape.group_size * shape.group_size <= self.max_work_group_size
            && shape.block_height >= self.vector_width
            && shape.block_height % self.vector_width == 0
            && shape.block_height <= self.max_block_height
            && shape.extra_param < self.variations;
        let rejected = self.reject.as_ref().is_some_and(|reject| reject(&shape));
        (on_grid && !rejected).then_some(Configuration {
            problem: *problem,
            shape,
        })
    }
}

type TimingFn = Box<dyn FnMut(&Configuration) -> Option<f64>>;

/// Oracle whose time comes from a closure; `None` means an invalid run.
pub struct SyntheticOracle {
    timing: TimingFn,
    pub calls: Vec<Shape>,
}

impl SyntheticOracle {
    pub fn new(timing: impl FnMut(&Configuration) -> Option<f64> + 'static) -> Self {
        Self {
            timing: Box::new(timing),
            calls: Vec::new(),
        }
    }

    /// Replays `times` in call order regardless of configuration.
    pub fn sequence(times: Vec<Option<f64>>) -> Self {
        let mut iter = times.into_iter();
        Self::new(move |_| iter.next().flatten())
    }
}

impl MeasurementOracle for SyntheticOracle {
    fn measure(
        &mut self,
        config: &Configuration,
        _transfer: BusTransfer,
    ) -> Result<Measurement, OracleError> {
        self.calls.push(config.shape);
        match (self.timing)(config) {
            Some(elapsed_ms) => Ok(Measurement {
                elapsed_ms,
                gflops: config.problem.flops() / (elapsed_ms * 1.0e6),
                valid: true,
                detail: vec![config.group_size(), config.block_height()],
            }),
            None => Err(OracleError::Dispatch(format!(
                "synthetic failure for {:?}",
                config.shape
            ))),
        }
    }
}
