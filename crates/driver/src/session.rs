//! Tuning session orchestration.

use anyhow::{anyhow, Result};
use gemvtune_autotune::journal::{Journal, JournaledOracle};
use gemvtune_autotune::tuner::{Autotuner, TuningOptions, TuningOutcome};
use gemvtune_backend_cpu::device::CpuDevice;
use gemvtune_backend_cpu::runtime::{CpuOracle, CpuOracleOptions};
use gemvtune_kernels::capability::DeviceCapability;
use gemvtune_kernels::matvec::DynMatvecKernel;
use gemvtune_kernels::registry::KernelRegistry;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// `cpu|gpu|acc` with an optional device number.
    pub device: String,
    pub journal: Option<PathBuf>,
    /// Kernel family name from the registry.
    pub kernel: String,
    pub vector_hint: bool,
    pub paranoid_check: bool,
    pub print_debug: bool,
}

impl SessionOptions {
    pub fn to_oracle_options(&self) -> CpuOracleOptions {
        CpuOracleOptions {
            paranoid_check: self.paranoid_check,
            print_output: self.print_debug,
            ..CpuOracleOptions::default()
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device: "cpu".into(),
            journal: None,
            kernel: "matvec".into(),
            vector_hint: true,
            paranoid_check: false,
            print_debug: false,
        }
    }
}

/// One device, one kernel family and one journal, shared by every tuning
/// run of the session.
pub struct TuningSession {
    device: CpuDevice,
    kernel: DynMatvecKernel,
    journal: Journal,
    options: SessionOptions,
}

impl TuningSession {
    pub fn new(options: SessionOptions) -> Result<Self> {
        let device = CpuDevice::select(&options.device)?;
        let registry = KernelRegistry::with_default_kernels(options.vector_hint);
        let kernel = registry.find(&options.kernel).ok_or_else(|| {
            anyhow!(
                "unknown kernel family {}, expected one of {:?}",
                options.kernel,
                registry.names()
            )
        })?;
        let journal = match &options.journal {
            Some(path) => Journal::load_from_file(path)?,
            None => Journal::new(),
        };

        info!(
            device = device.name(),
            compute_units = device.compute_units(),
            kernel = kernel.name(),
            journal_entries = journal.len(),
            "tuning session ready"
        );
        Ok(Self {
            device,
            kernel,
            journal,
            options,
        })
    }

    pub fn capability(&self) -> DeviceCapability {
        self.device.capability(self.kernel.clone())
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn tune(&mut self, options: TuningOptions) -> Result<TuningOutcome> {
        let capability = self.capability();
        let tuner = Autotuner::new(&capability, options)?;
        let oracle = CpuOracle::new(
            &self.device,
            self.kernel.clone(),
            tuner.options().problem,
            self.options.to_oracle_options(),
        )?;

        let mut oracle = JournaledOracle::new(&mut self.journal, oracle);
        let outcome = tuner.tune(&mut oracle)?;
        info!(
            journal_hits = oracle.hits(),
            best = ?outcome.best_config().map(|config| config.shape),
            "tuning run finished"
        );
        Ok(outcome)
    }

    /// Persist the journal, if the session has one.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(path) = &self.options.journal {
            self.journal.save_to_file(path)?;
            info!(path = %path.display(), entries = self.journal.len(), "journal saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_kernel_family() {
        let options = SessionOptions {
            kernel: "gemm".into(),
            ..SessionOptions::default()
        };
        let err = TuningSession::new(options).err().expect("unknown family");
        assert!(err.to_string().contains("unknown kernel family gemm"));
    }

    #[test]
    fn rejects_unavailable_device() {
        let options = SessionOptions {
            device: "gpu0".into(),
            ..SessionOptions::default()
        };
        assert!(TuningSession::new(options).is_err());
    }
}
