//! Candidate pool generation under pinned dimensions.

use gemvtune_kernels::capability::CapabilityProvider;
use gemvtune_kernels::config::{Configuration, MatvecProblem, Shape, ShapePins};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Group-size constants of the free-shape search.
///
/// The defaults (descend to above 8, always try 8) match a 64-wide hardware
/// wavefront with square work groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConstants {
    /// Upper bound on the group size, before the device limit is applied.
    pub max_group_size: usize,
    /// Exclusive lower bound of the group-size descent.
    pub descent_floor: usize,
    /// Group size whose cross product is always appended.
    pub baseline_group_size: usize,
}

impl Default for SearchConstants {
    fn default() -> Self {
        Self {
            max_group_size: 16,
            descent_floor: 8,
            baseline_group_size: 8,
        }
    }
}

/// Ordered candidates from one generator call. The extra parameter varies
/// fastest, then block height, then group size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidatePool {
    configs: Vec<Configuration>,
}

impl CandidatePool {
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Configuration> {
        self.configs.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Configuration> {
        self.configs.iter()
    }

    fn push_unique(&mut self, config: Configuration) -> bool {
        if self.configs.contains(&config) {
            return false;
        }
        self.configs.push(config);
        true
    }
}

impl FromIterator<Configuration> for CandidatePool {
    fn from_iter<I: IntoIterator<Item = Configuration>>(iter: I) -> Self {
        let mut pool = Self::default();
        for config in iter {
            pool.push_unique(config);
        }
        pool
    }
}

impl<'p> IntoIterator for &'p CandidatePool {
    type Item = &'p Configuration;
    type IntoIter = std::slice::Iter<'p, Configuration>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

/// Builds candidate pools by filtering shapes through a capability provider.
pub struct ParameterSpace<'a> {
    capability: &'a dyn CapabilityProvider,
    constants: SearchConstants,
}

impl<'a> ParameterSpace<'a> {
    pub fn new(capability: &'a dyn CapabilityProvider, constants: SearchConstants) -> Self {
        Self {
            capability,
            constants,
        }
    }

    pub fn capability(&self) -> &'a dyn CapabilityProvider {
        self.capability
    }

    pub fn generate(&self, problem: &MatvecProblem, pins: &ShapePins) -> CandidatePool {
        let mut pool = CandidatePool::default();
        let block_heights = self.block_heights(pins.block_height);
        let extra_params = self.extra_params(pins.extra_param);

        match pins.group_size {
            Some(group_size) => {
                self.collect_group(&mut pool, problem, group_size, &block_heights, &extra_params);
            }
            None => {
                let floor = self.constants.descent_floor;
                let mut group_size = self.descent_start();
                while group_size > floor {
                    if self.collect_group(&mut pool, problem, group_size, &block_heights, &extra_params) > 0 {
                        debug!(group_size, "largest valid group size");
                        break;
                    }
                    group_size -= 1;
                }
                self.collect_group(
                    &mut pool,
                    problem,
                    self.constants.baseline_group_size,
                    &block_heights,
                    &extra_params,
                );
            }
        }

        debug!(
            m = problem.m,
            n = problem.n,
            transpose = problem.transpose,
            ?pins,
            candidates = pool.len(),
            "generated candidate pool"
        );
        pool
    }

    /// `min(max_group_size, floor(sqrt(device max work-group size)))`.
    pub fn descent_start(&self) -> usize {
        let device_max = (self.capability.max_work_group_size() as f64).sqrt().floor() as usize;
        self.constants.max_group_size.min(device_max)
    }

    fn block_heights(&self, pinned: Option<usize>) -> Vec<usize> {
        match pinned {
            Some(block_height) => vec![block_height],
            None => {
                let vw = self.capability.vector_width().max(1);
                (vw..=self.capability.max_block_height()).step_by(vw).collect()
            }
        }
    }

    fn extra_params(&self, pinned: Option<usize>) -> Range<usize> {
        match pinned {
            Some(extra_param) => extra_param..extra_param + 1,
            None => 0..self.capability.total_extra_param_variations(),
        }
    }

    /// Push every valid `(block_height, extra_param)` at `group_size`;
    /// returns how many were added.
    fn collect_group(
        &self,
        pool: &mut CandidatePool,
        problem: &MatvecProblem,
        group_size: usize,
        block_heights: &[usize],
        extra_params: &Range<usize>,
    ) -> usize {
        let mut added = 0;
        for &block_height in block_heights {
            for extra_param in extra_params.clone() {
                let shape = Shape::new(group_size, block_height, extra_param);
                if let Some(config) = self.capability.try_apply(problem, shape) {
                    if pool.push_unique(config) {
                        added += 1;
                    }
                }
            }
        }
        added
    }
}
