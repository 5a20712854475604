//! Measurement oracle interface.

use gemvtune_kernels::config::Configuration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which host/device copies are counted in the timed region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusTransfer {
    pub to_device: bool,
    pub from_device: bool,
}

/// Outcome of one timed trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub elapsed_ms: f64,
    pub gflops: f64,
    /// False when the kernel ran but its output failed verification.
    pub valid: bool,
    /// Backend specific detail, carried through to reports untouched.
    pub detail: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("configuration rejected by device: {0}")]
    InvalidConfiguration(String),
    #[error("configuration targets m={m} n={n} but the oracle holds other operands")]
    ProblemMismatch { m: usize, n: usize },
    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),
}

/// Executes one timed trial of a configuration.
///
/// Calls are synchronous and must be repeatable for the same configuration.
pub trait MeasurementOracle {
    fn measure(
        &mut self,
        config: &Configuration,
        transfer: BusTransfer,
    ) -> Result<Measurement, OracleError>;

    /// Called once before every benchmark pass. With `replay` unset the
    /// pass must reach the device on every round.
    fn begin_pass(&mut self, _replay: bool) {}
}

impl<O: MeasurementOracle + ?Sized> MeasurementOracle for &mut O {
    fn measure(
        &mut self,
        config: &Configuration,
        transfer: BusTransfer,
    ) -> Result<Measurement, OracleError> {
        (**self).measure(config, transfer)
    }

    fn begin_pass(&mut self, replay: bool) {
        (**self).begin_pass(replay)
    }
}
