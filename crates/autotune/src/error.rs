//! Error taxonomy for the search engine.

use gemvtune_kernels::config::ShapePins;
use std::fmt;
use thiserror::Error;

/// Phase of a tuning run, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// Single pass over the whole candidate pool.
    Exhaustive,
    /// Extra parameter pinned, group size and block height free.
    Expectation,
    /// Group size and block height pinned, extra parameter free.
    Maximization,
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchPhase::Exhaustive => "exhaustive",
            SearchPhase::Expectation => "expectation",
            SearchPhase::Maximization => "maximization",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TuneError {
    /// Caller constraints are inconsistent; nothing was measured.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The generator found no valid configuration for the given pins.
    #[error("no valid configurations for pins {pins:?}")]
    EmptyCandidatePool { pins: ShapePins },

    /// Every candidate of a round failed; fatal in the maximization phase.
    #[error(
        "no good kernels found for group size {group_size} and block height {block_height} during {phase}, giving up"
    )]
    NoValidCandidate {
        phase: SearchPhase,
        group_size: usize,
        block_height: usize,
    },

    /// The expectation phase tried every extra-parameter seed without success.
    #[error("no good kernels found for any of {variations} extra parameter values")]
    ExtraParamExhausted { variations: usize },

    #[error("alternating search did not converge within {limit} iterations")]
    IterationLimit { limit: usize },
}

pub type TuneResult<T> = Result<T, TuneError>;
