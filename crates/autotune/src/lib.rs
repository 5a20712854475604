//! Autotuning search engine for gemvtune kernels.
//!
//! A tuning run flows through these pieces:
//!
//! - [`space::ParameterSpace`] turns pinned dimensions into an ordered
//!   [`space::CandidatePool`] of configurations the device accepts.
//! - [`trials::BenchmarkLoop`] drives a [`oracle::MeasurementOracle`] over the
//!   pool for a warm-up plus N measured rounds, pruning with
//!   [`prune::prune`] and ranking with [`prune::rank`].
//! - [`search::AlternatingSearch`] alternates shape and extra-parameter
//!   searches until the best triple stops changing.
//! - [`journal::Journal`] memoizes measurements across runs.
//! - [`tuner::Autotuner`] validates [`tuner::TuningOptions`] and runs either mode.

pub mod error;
pub mod journal;
pub mod oracle;
pub mod prune;
pub mod search;
pub mod space;
pub mod trials;
pub mod tuner;

#[cfg(test)]
mod fixtures;

pub use error::*;
pub use journal::*;
pub use oracle::*;
pub use prune::*;
pub use search::*;
pub use space::*;
pub use trials::*;
pub use tuner::*;
