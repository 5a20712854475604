//! Core autotuning entry point.

use crate::error::{SearchPhase, TuneError, TuneResult};
use crate::oracle::{BusTransfer, MeasurementOracle};
use crate::search::{AlternatingSearch, AlternatingSettings, BestRecord};
use crate::space::{CandidatePool, ParameterSpace, SearchConstants};
use crate::trials::{BenchmarkLoop, TrialReport};
use gemvtune_kernels::capability::CapabilityProvider;
use gemvtune_kernels::config::{Configuration, MatvecProblem, ShapePins};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Benchmark the full candidate pool for the given pins.
    Exhaustive,
    /// Alternate between shape and extra-parameter searches until stable.
    Alternating,
}

/// Everything a tuning run depends on. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningOptions {
    pub problem: MatvecProblem,
    pub pins: ShapePins,
    /// Measured rounds; the warm-up comes on top.
    pub trials: usize,
    pub retention: Option<usize>,
    pub mode: SearchMode,
    pub transfer: BusTransfer,
    pub constants: SearchConstants,
    pub max_iterations: usize,
}

impl TuningOptions {
    pub fn new(problem: MatvecProblem) -> Self {
        Self {
            problem,
            pins: ShapePins::free(),
            trials: 1,
            retention: None,
            mode: SearchMode::Exhaustive,
            transfer: BusTransfer::default(),
            constants: SearchConstants::default(),
            max_iterations: AlternatingSettings::default().max_iterations,
        }
    }

    /// Check caller constraints against the kernel's capability surface.
    /// All violations are reported together.
    pub fn validate(&self, capability: &dyn CapabilityProvider) -> TuneResult<()> {
        let vw = capability.vector_width();
        let variations = capability.total_extra_param_variations();
        let ShapePins {
            group_size,
            block_height,
            extra_param,
        } = self.pins;
        let mut problems = Vec::new();

        if self.problem.m == 0 || self.problem.n == 0 {
            problems.push("matrix dimensions must be positive".to_string());
        }
        if vw == 0 || self.problem.n % vw != 0 {
            problems.push(format!("matrix dimension N must be multiple of {vw}"));
        }
        if vw == 0 || self.problem.m % vw != 0 {
            problems.push(format!("matrix dimension M must be multiple of {vw}"));
        }
        if group_size.is_none() && block_height.is_some() {
            problems.push("group size must be specified with block height".into());
        }
        if group_size.is_none() && block_height.is_none() && extra_param.is_some() {
            problems.push(
                "group size and block height must be specified with extra parameter".into(),
            );
        }
        if let Some(g) = group_size {
            if g < 1 || g > self.constants.max_group_size {
                problems.push(format!(
                    "work item group size must be a number from 1 to {} inclusive",
                    self.constants.max_group_size
                ));
            }
        }
        if let Some(bh) = block_height {
            if vw == 0 || bh < vw || bh % vw != 0 {
                problems.push(format!("inner blocking height must be a positive multiple of {vw}"));
            }
        }
        if let Some(xp) = extra_param {
            if xp >= variations {
                problems.push(format!("extra parameter must be less than {variations}"));
            }
        }
        if variations == 0 {
            problems.push("kernel reports an empty extra parameter domain".into());
        }
        if self.mode == SearchMode::Alternating && !self.pins.is_free() {
            problems.push(
                "expectation maximization optimization will find optimal blocking".into(),
            );
        }
        if self.trials == 0 {
            problems.push("number of trials must be at least 1".into());
        }
        if self.retention == Some(0) {
            problems.push("top N must be at least 1".into());
        }
        if self.max_iterations == 0 {
            problems.push("iteration bound must be at least 1".into());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TuneError::InvalidConfiguration(problems.join("; ")))
        }
    }
}

/// What a tuning run found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningOutcome {
    pub mode: SearchMode,
    /// Winner, indexed into `pool`; `None` when an exhaustive run had no
    /// surviving candidate.
    pub best: Option<BestRecord>,
    pub pool: CandidatePool,
    pub report: TrialReport,
    /// Alternating iterations until convergence; zero for exhaustive runs.
    pub iterations: usize,
    /// Multi-trial statistics at the winning configuration.
    pub confirmation: Option<TrialReport>,
}

impl TuningOutcome {
    pub fn best_config(&self) -> Option<&Configuration> {
        self.best.and_then(|best| self.pool.get(best.index))
    }
}

pub struct Autotuner<'a> {
    capability: &'a dyn CapabilityProvider,
    options: TuningOptions,
}

impl<'a> Autotuner<'a> {
    pub fn new(capability: &'a dyn CapabilityProvider, options: TuningOptions) -> TuneResult<Self> {
        options.validate(capability)?;
        Ok(Self {
            capability,
            options,
        })
    }

    pub fn options(&self) -> &TuningOptions {
        &self.options
    }

    pub fn space(&self) -> ParameterSpace<'a> {
        ParameterSpace::new(self.capability, self.options.constants)
    }

    pub fn tune(&self, oracle: &mut dyn MeasurementOracle) -> TuneResult<TuningOutcome> {
        info!(
            m = self.options.problem.m,
            n = self.options.problem.n,
            transpose = self.options.problem.transpose,
            mode = ?self.options.mode,
            trials = self.options.trials,
            retention = ?self.options.retention,
            "starting tuning run"
        );
        match self.options.mode {
            SearchMode::Exhaustive => self.exhaustive(oracle),
            SearchMode::Alternating => self.alternating(oracle),
        }
    }

    fn exhaustive(&self, oracle: &mut dyn MeasurementOracle) -> TuneResult<TuningOutcome> {
        let pool = self.space().generate(&self.options.problem, &self.options.pins);
        if pool.is_empty() {
            if !self.options.pins.is_free() {
                return Err(TuneError::EmptyCandidatePool {
                    pins: self.options.pins,
                });
            }
            warn!(
                phase = %SearchPhase::Exhaustive,
                m = self.options.problem.m,
                n = self.options.problem.n,
                "no valid configurations for this problem"
            );
            return Ok(TuningOutcome {
                mode: SearchMode::Exhaustive,
                best: None,
                pool,
                report: TrialReport::default(),
                iterations: 0,
                confirmation: None,
            });
        }

        let report = BenchmarkLoop::new(oracle, self.options.transfer).run_trials(
            &pool,
            self.options.trials,
            self.options.retention,
        );
        let best = report.best().and_then(|index| {
            pool.get(index).map(|config| BestRecord {
                shape: config.shape,
                index,
            })
        });
        if best.is_none() {
            warn!(
                phase = %SearchPhase::Exhaustive,
                candidates = pool.len(),
                "no candidate survived the benchmark"
            );
        }

        Ok(TuningOutcome {
            mode: SearchMode::Exhaustive,
            best,
            pool,
            report,
            iterations: 0,
            confirmation: None,
        })
    }

    fn alternating(&self, oracle: &mut dyn MeasurementOracle) -> TuneResult<TuningOutcome> {
        let space = self.space();
        let settings = AlternatingSettings {
            rounds_per_phase: 1,
            retention: self.options.retention,
            transfer: self.options.transfer,
            max_iterations: self.options.max_iterations,
            initial_seed: 0,
        };
        let outcome = AlternatingSearch::new(&space, self.options.problem, settings).run(oracle)?;

        let confirmation = if self.options.trials > 1 {
            let pool = space.generate(&self.options.problem, &ShapePins::all(outcome.best.shape));
            let report = BenchmarkLoop::new(oracle, self.options.transfer)
                .fresh()
                .run_trials(&pool, self.options.trials, self.options.retention);
            Some(report)
        } else {
            None
        };

        Ok(TuningOutcome {
            mode: SearchMode::Alternating,
            best: Some(outcome.best),
            pool: outcome.pool,
            report: outcome.report,
            iterations: outcome.iterations,
            confirmation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{GridCapability, SyntheticOracle};
    use crate::journal::{Journal, JournaledOracle};
    use gemvtune_kernels::config::Shape;

    fn options() -> TuningOptions {
        TuningOptions::new(MatvecProblem::new(256, 256))
    }

    #[test]
    fn rejects_block_height_without_group_size() {
        let cap = GridCapability::permissive();
        let opts = TuningOptions {
            pins: ShapePins {
                block_height: Some(8),
                ..ShapePins::free()
            },
            ..options()
        };
        let err = opts.validate(&cap).expect_err("invalid pins");
        assert!(err.to_string().contains("group size must be specified with block height"));
    }

    #[test]
    fn rejects_pins_in_alternating_mode() {
        let cap = GridCapability::permissive();
        let opts = TuningOptions {
            mode: SearchMode::Alternating,
            pins: ShapePins::shape(8, 4),
            ..options()
        };
        assert!(matches!(
            opts.validate(&cap),
            Err(TuneError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn reports_every_violation() {
        let cap = GridCapability::permissive();
        let opts = TuningOptions {
            problem: MatvecProblem::new(30, 30),
            trials: 0,
            ..options()
        };
        let message = opts.validate(&cap).expect_err("invalid").to_string();
        assert!(message.contains("N must be multiple of 4"));
        assert!(message.contains("M must be multiple of 4"));
        assert!(message.contains("trials"));
    }

    #[test]
    fn pinned_but_invalid_shape_is_empty_pool() {
        let cap = GridCapability::permissive().rejecting(|shape| shape.group_size == 4);
        let opts = TuningOptions {
            pins: ShapePins::all(Shape::new(4, 4, 0)),
            ..options()
        };
        let tuner = Autotuner::new(&cap, opts).expect("valid options");
        let mut oracle = SyntheticOracle::new(|_| Some(1.0));
        assert!(matches!(
            tuner.tune(&mut oracle),
            Err(TuneError::EmptyCandidatePool { .. })
        ));
        assert!(oracle.calls.is_empty());
    }

    #[test]
    fn unpinned_problem_without_valid_shapes_has_no_winner() {
        let cap = GridCapability::permissive().rejecting(|_| true);
        let tuner = Autotuner::new(&cap, options()).expect("valid options");
        let mut oracle = SyntheticOracle::new(|_| Some(1.0));

        let outcome = tuner.tune(&mut oracle).expect("empty result, not an error");
        assert!(outcome.best.is_none());
        assert!(outcome.pool.is_empty());
        assert!(outcome.report.records.is_empty());
        assert!(oracle.calls.is_empty());
    }

    #[test]
    fn exhaustive_run_ranks_pool() {
        let cap = GridCapability::permissive();
        let opts = TuningOptions {
            trials: 2,
            retention: Some(3),
            ..options()
        };
        let tuner = Autotuner::new(&cap, opts).expect("valid options");
        let mut oracle = SyntheticOracle::new(|config| {
            Some(config.block_height() as f64 + config.extra_param() as f64 * 0.5)
        });

        let outcome = tuner.tune(&mut oracle).expect("tuned");
        let best = outcome.best_config().expect("winner");
        assert_eq!((best.block_height(), best.extra_param()), (4, 0));
        assert_eq!(best.group_size(), 16);
        assert!(outcome.pool.iter().any(|c| c.group_size() == 8));
    }

    #[test]
    fn alternating_run_confirms_with_extra_trials() {
        let cap = GridCapability::permissive();
        let opts = TuningOptions {
            mode: SearchMode::Alternating,
            trials: 4,
            ..options()
        };
        let tuner = Autotuner::new(&cap, opts).expect("valid options");
        let mut oracle = SyntheticOracle::new(|config| {
            Some((config.group_size() as f64 - 8.0).abs() + config.extra_param() as f64)
        });

        let outcome = tuner.tune(&mut oracle).expect("tuned");
        let best = outcome.best.expect("winner");
        assert_eq!(best.shape.group_size, 8);
        assert_eq!(best.shape.extra_param, 0);
        let confirmation = outcome.confirmation.expect("confirmation pass");
        assert_eq!(confirmation.records.len(), 1);
        assert_eq!(confirmation.records[0].count, 4);
    }

    #[test]
    fn confirmation_trials_reach_the_device() {
        let cap = GridCapability::permissive();
        let opts = TuningOptions {
            mode: SearchMode::Alternating,
            trials: 3,
            ..options()
        };
        let tuner = Autotuner::new(&cap, opts).expect("valid options");
        let mut journal = Journal::new();
        let mut calls = 0usize;
        // A tiny drift per call keeps repeated measurements distinguishable.
        let mut inner = SyntheticOracle::new(move |config| {
            calls += 1;
            let base = (config.group_size() as f64 - 8.0).abs() + config.extra_param() as f64;
            Some(base + calls as f64 * 1e-6)
        });

        let outcome = tuner
            .tune(&mut JournaledOracle::new(&mut journal, &mut inner))
            .expect("tuned");
        let best = outcome.best.expect("winner").shape;
        let confirmation = outcome.confirmation.expect("confirmation pass");
        assert_eq!(confirmation.records[0].count, 3);
        assert!(confirmation.records[0].variance() > 0.0);

        // Warm-up plus three measured rounds, all on the winning shape.
        let tail = &inner.calls[inner.calls.len() - 4..];
        assert!(tail.iter().all(|&shape| shape == best));
    }
}
