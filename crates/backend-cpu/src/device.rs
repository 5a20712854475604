//! Host device selection and limits.

use anyhow::{bail, Result};
use gemvtune_kernels::capability::{DeviceCapability, DeviceLimits};
use gemvtune_kernels::matvec::DynMatvecKernel;

/// Device kinds a selector can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
}

/// Parse `cpu|gpu|acc` with an optional device number suffix.
pub fn parse_selector(selector: &str) -> Result<(DeviceKind, usize)> {
    let (kind, rest) = if let Some(rest) = selector.strip_prefix("cpu") {
        (DeviceKind::Cpu, rest)
    } else if let Some(rest) = selector.strip_prefix("gpu") {
        (DeviceKind::Gpu, rest)
    } else if let Some(rest) = selector.strip_prefix("acc") {
        (DeviceKind::Accelerator, rest)
    } else {
        bail!("invalid device {selector}");
    };

    let index = if rest.is_empty() {
        0
    } else {
        match rest.parse::<usize>() {
            Ok(index) => index,
            Err(_) => bail!("invalid device {selector}"),
        }
    };
    Ok((kind, index))
}

/// The host processor driven as a single accelerator device.
#[derive(Debug, Clone)]
pub struct CpuDevice {
    name: String,
    limits: DeviceLimits,
    compute_units: usize,
}

impl CpuDevice {
    pub fn new(limits: DeviceLimits) -> Self {
        Self {
            name: "host cpu (rayon)".into(),
            limits,
            compute_units: rayon::current_num_threads(),
        }
    }

    pub fn select(selector: &str) -> Result<Self> {
        match parse_selector(selector)? {
            (DeviceKind::Cpu, 0) => Ok(Self::new(DeviceLimits::default())),
            (DeviceKind::Cpu, index) => bail!("cpu device {index} not found, only cpu0 is available"),
            (kind, _) => bail!("no {kind:?} devices available on this host"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compute_units(&self) -> usize {
        self.compute_units
    }

    /// Bind a kernel family to this device's limits.
    pub fn capability(&self, kernel: DynMatvecKernel) -> DeviceCapability {
        DeviceCapability::new(self.limits, kernel)
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new(DeviceLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selectors() {
        assert_eq!(parse_selector("cpu").ok(), Some((DeviceKind::Cpu, 0)));
        assert_eq!(parse_selector("gpu2").ok(), Some((DeviceKind::Gpu, 2)));
        assert_eq!(parse_selector("acc").ok(), Some((DeviceKind::Accelerator, 0)));
        assert!(parse_selector("tpu").is_err());
        assert!(parse_selector("cpux").is_err());
    }

    #[test]
    fn only_host_cpu_is_selectable() {
        assert!(CpuDevice::select("cpu0").is_ok());
        assert!(CpuDevice::select("cpu1").is_err());
        assert!(CpuDevice::select("gpu").is_err());
    }
}
