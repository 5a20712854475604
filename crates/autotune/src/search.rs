//! Alternating two-phase search over shape and extra parameter.
//!
//! The expectation phase pins the extra parameter and searches group size
//! and block height; the maximization phase pins the winning shape and
//! searches the extra parameter. The loop stops once a full iteration
//! reproduces the previous best triple.

use crate::error::{SearchPhase, TuneError, TuneResult};
use crate::oracle::{BusTransfer, MeasurementOracle};
use crate::space::{CandidatePool, ParameterSpace};
use crate::trials::{BenchmarkLoop, TrialReport};
use gemvtune_kernels::config::{MatvecProblem, Shape, ShapePins};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Current best shape and its index in the pool it was ranked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestRecord {
    pub shape: Shape,
    pub index: usize,
}

/// Knobs for the alternating search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlternatingSettings {
    /// Measured rounds per phase, after the warm-up.
    pub rounds_per_phase: usize,
    pub retention: Option<usize>,
    pub transfer: BusTransfer,
    /// Upper bound on expectation/maximization iterations.
    pub max_iterations: usize,
    /// Extra parameter pinned by the first expectation phase.
    pub initial_seed: usize,
}

impl Default for AlternatingSettings {
    fn default() -> Self {
        Self {
            rounds_per_phase: 1,
            retention: None,
            transfer: BusTransfer::default(),
            max_iterations: 64,
            initial_seed: 0,
        }
    }
}

#[derive(Debug)]
pub enum SearchState {
    /// Extra parameter pinned to `seed`; `attempts` seeds have failed so far
    /// in this iteration.
    SearchE { seed: usize, attempts: usize },
    /// Group size and block height pinned.
    SearchM { group_size: usize, block_height: usize },
    Converged(BestRecord),
    Failed(TuneError),
}

/// Result of a converged search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: BestRecord,
    /// Completed expectation/maximization iterations.
    pub iterations: usize,
    /// Pool and statistics of the final maximization phase.
    pub pool: CandidatePool,
    pub report: TrialReport,
}

pub struct AlternatingSearch<'s, 'a> {
    space: &'s ParameterSpace<'a>,
    problem: MatvecProblem,
    settings: AlternatingSettings,
}

impl<'s, 'a> AlternatingSearch<'s, 'a> {
    pub fn new(
        space: &'s ParameterSpace<'a>,
        problem: MatvecProblem,
        settings: AlternatingSettings,
    ) -> Self {
        Self {
            space,
            problem,
            settings,
        }
    }

    pub fn run(&self, oracle: &mut dyn MeasurementOracle) -> TuneResult<SearchOutcome> {
        let variations = self.space.capability().total_extra_param_variations();
        if variations == 0 {
            return Err(TuneError::InvalidConfiguration(
                "kernel reports an empty extra parameter domain".into(),
            ));
        }

        let mut state = SearchState::SearchE {
            seed: self.settings.initial_seed % variations,
            attempts: 0,
        };
        let mut previous: Option<Shape> = None;
        let mut iterations = 0;
        let mut last_phase: Option<(CandidatePool, TrialReport)> = None;

        loop {
            state = match state {
                SearchState::SearchE { seed, attempts } => {
                    if attempts >= variations {
                        SearchState::Failed(TuneError::ExtraParamExhausted { variations })
                    } else {
                        let (pool, report) = self.phase(oracle, ShapePins::extra_param(seed));
                        match report.best().and_then(|index| pool.get(index)) {
                            Some(config) => {
                                debug!(
                                    phase = %SearchPhase::Expectation,
                                    seed,
                                    group_size = config.group_size(),
                                    block_height = config.block_height(),
                                    "expectation phase picked shape"
                                );
                                SearchState::SearchM {
                                    group_size: config.group_size(),
                                    block_height: config.block_height(),
                                }
                            }
                            None => {
                                let next = (seed + 1) % variations;
                                warn!(
                                    phase = %SearchPhase::Expectation,
                                    seed,
                                    next,
                                    "no good kernels for extra parameter, trying next"
                                );
                                SearchState::SearchE {
                                    seed: next,
                                    attempts: attempts + 1,
                                }
                            }
                        }
                    }
                }
                SearchState::SearchM {
                    group_size,
                    block_height,
                } => {
                    let (pool, report) =
                        self.phase(oracle, ShapePins::shape(group_size, block_height));
                    let best = report
                        .best()
                        .and_then(|index| pool.get(index).map(|config| (index, config.shape)));
                    match best {
                        None => SearchState::Failed(TuneError::NoValidCandidate {
                            phase: SearchPhase::Maximization,
                            group_size,
                            block_height,
                        }),
                        Some((index, shape)) => {
                            iterations += 1;
                            let record = BestRecord { shape, index };
                            last_phase = Some((pool, report));
                            info!(
                                iteration = iterations,
                                group_size = shape.group_size,
                                block_height = shape.block_height,
                                extra_param = shape.extra_param,
                                "alternating search iteration"
                            );
                            if previous == Some(shape) {
                                SearchState::Converged(record)
                            } else if iterations >= self.settings.max_iterations {
                                SearchState::Failed(TuneError::IterationLimit {
                                    limit: self.settings.max_iterations,
                                })
                            } else {
                                previous = Some(shape);
                                SearchState::SearchE {
                                    seed: shape.extra_param,
                                    attempts: 0,
                                }
                            }
                        }
                    }
                }
                SearchState::Converged(best) => {
                    let (pool, report) = last_phase.unwrap_or_default();
                    info!(iterations, shape = ?best.shape, "alternating search converged");
                    return Ok(SearchOutcome {
                        best,
                        iterations,
                        pool,
                        report,
                    });
                }
                SearchState::Failed(err) => {
                    warn!(error = %err, "alternating search failed");
                    return Err(err);
                }
            };
        }
    }

    fn phase(
        &self,
        oracle: &mut dyn MeasurementOracle,
        pins: ShapePins,
    ) -> (CandidatePool, TrialReport) {
        let pool = self.space.generate(&self.problem, &pins);
        let report = BenchmarkLoop::new(oracle, self.settings.transfer).run_trials(
            &pool,
            self.settings.rounds_per_phase,
            self.settings.retention,
        );
        (pool, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{GridCapability, SyntheticOracle};
    use crate::space::SearchConstants;

    fn problem() -> MatvecProblem {
        MatvecProblem::new(256, 256)
    }

    /// Separable bowl with its minimum at group size 12, block height 8,
    /// extra parameter 2.
    fn bowl(shape: &Shape) -> f64 {
        let g = shape.group_size as f64 - 12.0;
        let b = shape.block_height as f64 - 8.0;
        let x = shape.extra_param as f64 - 2.0;
        1.0 + g * g + b * b + 4.0 * x * x
    }

    #[test]
    fn converges_on_separable_minimum() {
        // Rejecting groups above 12 stops the descent there.
        let cap = GridCapability::permissive()
            .with_variations(4)
            .rejecting(|shape| shape.group_size > 12);
        let space = ParameterSpace::new(&cap, SearchConstants::default());
        let mut oracle = SyntheticOracle::new(|config| Some(bowl(&config.shape)));

        let outcome = AlternatingSearch::new(&space, problem(), AlternatingSettings::default())
            .run(&mut oracle)
            .expect("search converges");

        assert_eq!(outcome.best.shape, Shape::new(12, 8, 2));
        assert_eq!(outcome.iterations, 2);
        assert_eq!(
            outcome.pool.get(outcome.best.index).map(|c| c.shape),
            Some(outcome.best.shape)
        );
    }

    #[test]
    fn expectation_phase_advances_seed_past_dead_extra_params() {
        let cap = GridCapability::permissive().with_variations(3);
        let space = ParameterSpace::new(&cap, SearchConstants::default());
        // Extra parameter 0 never runs; 1 is fastest.
        let mut oracle = SyntheticOracle::new(|config| match config.extra_param() {
            0 => None,
            xp => Some(10.0 * xp as f64 + config.block_height() as f64),
        });

        let outcome = AlternatingSearch::new(&space, problem(), AlternatingSettings::default())
            .run(&mut oracle)
            .expect("search converges");
        assert_eq!(outcome.best.shape.extra_param, 1);
        assert_eq!(outcome.best.shape.block_height, 4);
    }

    #[test]
    fn exhausted_extra_param_domain_fails() {
        let cap = GridCapability::permissive().with_variations(3);
        let space = ParameterSpace::new(&cap, SearchConstants::default());
        let mut oracle = SyntheticOracle::new(|_| None);

        let err = AlternatingSearch::new(&space, problem(), AlternatingSettings::default())
            .run(&mut oracle)
            .expect_err("nothing is valid");
        assert!(matches!(err, TuneError::ExtraParamExhausted { variations: 3 }));
    }

    #[test]
    fn maximization_failure_is_fatal_and_not_retried() {
        let cap = GridCapability::permissive()
            .with_variations(3)
            .rejecting(|shape| shape.group_size > 12);
        let space = ParameterSpace::new(&cap, SearchConstants::default());
        // Warm-up plus one measured round over the first expectation pool
        // succeeds; every later call fails.
        let expectation_calls = 2 * space.generate(&problem(), &ShapePins::extra_param(0)).len();
        let mut calls = 0usize;
        let mut oracle = SyntheticOracle::new(move |config| {
            calls += 1;
            (calls <= expectation_calls).then(|| bowl(&config.shape))
        });

        let err = AlternatingSearch::new(&space, problem(), AlternatingSettings::default())
            .run(&mut oracle)
            .expect_err("maximization has no valid candidate");
        match err {
            TuneError::NoValidCandidate {
                phase,
                group_size,
                block_height,
            } => {
                assert_eq!(phase, SearchPhase::Maximization);
                assert_eq!((group_size, block_height), (12, 8));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // The maximization pool fails during warm-up and is never retried.
        assert_eq!(oracle.calls.len(), expectation_calls + cap.variations);
    }

    #[test]
    fn iteration_bound_is_reported() {
        let cap = GridCapability::permissive()
            .with_variations(4)
            .rejecting(|shape| shape.group_size > 12);
        let space = ParameterSpace::new(&cap, SearchConstants::default());
        let mut oracle = SyntheticOracle::new(|config| Some(bowl(&config.shape)));
        let settings = AlternatingSettings {
            max_iterations: 1,
            ..AlternatingSettings::default()
        };

        let err = AlternatingSearch::new(&space, problem(), settings)
            .run(&mut oracle)
            .expect_err("one iteration cannot confirm convergence");
        assert!(matches!(err, TuneError::IterationLimit { limit: 1 }));
    }
}
