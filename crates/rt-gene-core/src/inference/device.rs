//! Compute device selection.

use candle_core::Device;
use tracing::{debug, info};

/// Picks the device the regressor runs on.
///
/// With `force_cpu` unset, the first accelerator compiled into this build
/// (Metal, then CUDA) that initialises wins; otherwise the CPU.
#[must_use]
pub fn select_device(force_cpu: bool) -> Device {
    if force_cpu {
        debug!("CPU requested explicitly");
        return Device::Cpu;
    }

    let device = accelerator().unwrap_or(Device::Cpu);
    info!("Running on {}", device_name(&device));
    device
}

/// Short lowercase name of a device backend.
#[must_use]
pub fn device_name(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

#[cfg(feature = "metal")]
fn accelerator() -> Option<Device> {
    Device::new_metal(0)
        .inspect_err(|e| debug!("Metal unavailable: {e}"))
        .ok()
}

#[cfg(all(feature = "cuda", not(feature = "metal")))]
fn accelerator() -> Option<Device> {
    Device::new_cuda(0)
        .inspect_err(|e| debug!("CUDA unavailable: {e}"))
        .ok()
}

#[cfg(not(any(feature = "metal", feature = "cuda")))]
#[allow(clippy::unnecessary_wraps)]
const fn accelerator() -> Option<Device> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_cpu() {
        assert!(select_device(true).is_cpu());
    }

    #[test]
    fn test_cpu_name() {
        assert_eq!(device_name(&Device::Cpu), "cpu");
    }

    #[cfg(not(any(feature = "metal", feature = "cuda")))]
    #[test]
    fn test_cpu_only_build_selects_cpu() {
        assert!(select_device(false).is_cpu());
    }
}
