//! CPU measurement oracle.

use crate::device::CpuDevice;
use anyhow::{Context, Result};
use gemvtune_autotune::oracle::{BusTransfer, Measurement, MeasurementOracle, OracleError};
use gemvtune_kernels::capability::{CapabilityProvider, DeviceCapability};
use gemvtune_kernels::config::{Configuration, MatvecProblem};
use gemvtune_kernels::matvec::{DynMatvecKernel, MatvecInputs, UNROLL_FACTORS};
use gemvtune_kernels::utils::max_relative_error;
use ndarray::{Array1, Array2};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CpuOracleOptions {
    /// Compare every output against the reference product.
    pub paranoid_check: bool,
    /// Log the output vector of every dispatch at debug level.
    pub print_output: bool,
    pub tolerance: f32,
}

impl Default for CpuOracleOptions {
    fn default() -> Self {
        Self {
            paranoid_check: false,
            print_output: false,
            tolerance: 1e-3,
        }
    }
}

/// Matrix and vectors of one problem.
#[derive(Debug, Clone)]
struct Operands {
    matrix: Array2<f32>,
    x: Array1<f32>,
    y: Array1<f32>,
}

impl Operands {
    /// Deterministic fill so repeated sessions check against the same data.
    fn synthetic(problem: &MatvecProblem) -> Self {
        let (rows, cols) = problem.matrix_dims();
        let matrix =
            Array2::from_shape_fn((rows, cols), |(i, j)| ((i * 7 + j * 3) % 11) as f32 * 0.1 - 0.5);
        let x = Array1::from_shape_fn(problem.n, |j| (j % 5) as f32 * 0.25 - 0.5);
        let y = Array1::from_shape_fn(problem.m, |i| (i % 3) as f32 * 0.5);
        Self { matrix, x, y }
    }

    fn inputs(&self, alpha: f32, beta: f32) -> MatvecInputs<'_> {
        MatvecInputs::new(self.matrix.view(), self.x.view()).with_accumulator(self.y.view(), alpha, beta)
    }
}

/// Times kernel dispatches on the host for one fixed problem.
pub struct CpuOracle {
    capability: DeviceCapability,
    problem: MatvecProblem,
    host: Operands,
    staged: Operands,
    readback: Array1<f32>,
    reference: Option<Array1<f32>>,
    alpha: f32,
    beta: f32,
    options: CpuOracleOptions,
}

impl CpuOracle {
    pub fn new(
        device: &CpuDevice,
        kernel: DynMatvecKernel,
        problem: MatvecProblem,
        options: CpuOracleOptions,
    ) -> Result<Self> {
        let host = Operands::synthetic(&problem);
        let (alpha, beta) = (1.5, 0.5);
        let reference = if options.paranoid_check {
            let reference = kernel
                .reference(&problem, &host.inputs(alpha, beta))
                .with_context(|| format!("reference product for {} failed", kernel.name()))?;
            Some(reference)
        } else {
            None
        };

        debug!(
            device = device.name(),
            kernel = kernel.name(),
            m = problem.m,
            n = problem.n,
            transpose = problem.transpose,
            "cpu oracle ready"
        );
        Ok(Self {
            capability: device.capability(kernel),
            problem,
            staged: host.clone(),
            host,
            readback: Array1::zeros(problem.m),
            reference,
            alpha,
            beta,
            options,
        })
    }

    pub fn problem(&self) -> MatvecProblem {
        self.problem
    }

    pub fn capability(&self) -> &DeviceCapability {
        &self.capability
    }

    /// Output of the last dispatch that was copied back to the host.
    pub fn readback(&self) -> &Array1<f32> {
        &self.readback
    }

    fn detail(&self, config: &Configuration) -> Vec<usize> {
        let vw = self.capability.vector_width();
        let rows_per_group = config.group_size() * config.block_height();
        let work_groups = if rows_per_group == 0 {
            0
        } else {
            config.problem.m / rows_per_group
        };
        vec![
            work_groups,
            rows_per_group,
            config.group_size() * vw,
            UNROLL_FACTORS[config.extra_param() % UNROLL_FACTORS.len()],
        ]
    }
}

impl MeasurementOracle for CpuOracle {
    fn measure(
        &mut self,
        config: &Configuration,
        transfer: BusTransfer,
    ) -> Result<Measurement, OracleError> {
        if config.problem != self.problem {
            return Err(OracleError::ProblemMismatch {
                m: config.problem.m,
                n: config.problem.n,
            });
        }
        let config = self
            .capability
            .try_apply(&config.problem, config.shape)
            .ok_or_else(|| OracleError::InvalidConfiguration(format!("{:?}", config.shape)))?;

        let start = Instant::now();
        if transfer.to_device {
            self.staged.clone_from(&self.host);
        }
        let output = self
            .capability
            .kernel()
            .run(&config, &self.staged.inputs(self.alpha, self.beta))
            .map_err(|err| OracleError::Dispatch(format!("{err:#}")))?;
        if transfer.from_device {
            self.readback.assign(&output);
        }
        let elapsed = start.elapsed();

        let elapsed_ms = (elapsed.as_secs_f64() * 1e3).max(f64::MIN_POSITIVE);
        let gflops = config.problem.flops() / (elapsed_ms * 1e6);

        if self.options.print_output {
            debug!(shape = ?config.shape, output = ?output.as_slice(), "dispatch output");
        }

        let valid = match &self.reference {
            Some(reference) => {
                let error = max_relative_error(output.view(), reference.view());
                if error > self.options.tolerance {
                    warn!(shape = ?config.shape, error, "output check failed");
                }
                error <= self.options.tolerance
            }
            None => true,
        };

        Ok(Measurement {
            elapsed_ms,
            gflops,
            valid,
            detail: self.detail(&config),
        })
    }
}
