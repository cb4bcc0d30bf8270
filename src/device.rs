//! Device placement for tensors and network parameters.
//!
//! Only the host (CPU) backend is compiled in. Placement is still tracked on every
//! tensor so that a batch built for one device is never fed to parameters living on
//! another one.

use std::fmt;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};

/// Compute device a network and its tensors are placed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Device {
    #[default]
    Cpu,
    Accelerator(usize),
}

impl Device {
    /// The best device available to this build.
    pub fn preferred() -> Self {
        Device::Cpu
    }

    /// Fails with `DeviceMismatch` unless `other` is this device.
    pub fn ensure_same(&self, other: Device) -> Result<()> {
        if *self == other {
            Ok(())
        } else {
            Err(DqnError::DeviceMismatch {
                expected: *self,
                actual: other,
            })
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(ordinal) => write!(f, "accelerator:{}", ordinal),
        }
    }
}

/// A dense `f32` array tagged with the device it lives on.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub data: ArrayD<f32>,
    pub device: Device,
}

impl Tensor {
    pub fn new(data: ArrayD<f32>, device: Device) -> Self {
        Tensor { data, device }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Moves the tensor to `device`. With a single host backend this only retags it.
    pub fn to(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn moving_a_tensor_only_retags_it() {
        let data = ArrayD::from_elem(IxDyn(&[2, 3]), 1.5);
        let moved = Tensor::new(data.clone(), Device::Cpu).to(Device::Accelerator(1));
        assert_eq!(moved.device, Device::Accelerator(1));
        assert_eq!(moved.data, data);
        assert_eq!(moved.shape(), &[2, 3]);
    }

    #[test]
    fn placement_check_names_both_devices() {
        assert!(Device::Cpu.ensure_same(Device::preferred()).is_ok());
        let err = Device::Cpu.ensure_same(Device::Accelerator(0)).unwrap_err();
        assert_eq!(err.to_string(), "Device mismatch: network lives on cpu, tensor on accelerator:0");
    }
}
