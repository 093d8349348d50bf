//! Capability interface over a compute device.
//!
//! The measurement code only needs four things from a GPU layer: allocate a
//! buffer, bind buffers to a kernel, dispatch it, and read back how long the
//! dispatch took. Backends implement [`ComputeDevice`]; the core never sees a
//! backend type directly.

use std::fmt;

use crate::binding::Bindings;
use crate::error::{ProbeError, Result};
use crate::kernel::KernelBinary;

/// Hardware-reported limits of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Backend / driver API in use.
    pub backend: String,
    /// Maximum invocations in one workgroup.
    pub max_workgroup_invocations: u32,
    /// Maximum workgroups in one dispatch dimension.
    pub max_workgroups_per_dimension: u32,
    /// Whether dispatch durations come from device timestamps.
    pub timestamp_queries: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, max {} invocations/workgroup)",
            self.name, self.backend, self.max_workgroup_invocations
        )
    }
}

/// Grid shape of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Invocations per workgroup (x dimension).
    pub workgroup_size: u32,
    /// Workgroups dispatched (x dimension).
    pub workgroups: u32,
}

impl LaunchConfig {
    /// Total invocations.
    pub fn global_threads(&self) -> u64 {
        self.workgroup_size as u64 * self.workgroups as u64
    }

    /// Check the shape against device limits.
    pub fn check(&self, info: &DeviceInfo) -> Result<()> {
        if self.workgroup_size == 0 || self.workgroups == 0 {
            return Err(ProbeError::InvalidConfig(format!(
                "launch ({}, 1) x {} is empty",
                self.workgroup_size, self.workgroups
            )));
        }
        if self.workgroup_size > info.max_workgroup_invocations {
            return Err(ProbeError::InvalidConfig(format!(
                "workgroup size {} exceeds device limit {}",
                self.workgroup_size, info.max_workgroup_invocations
            )));
        }
        if self.workgroups > info.max_workgroups_per_dimension {
            return Err(ProbeError::InvalidConfig(format!(
                "{} workgroups exceed device limit {}",
                self.workgroups, info.max_workgroups_per_dimension
            )));
        }
        if self.global_threads() > u32::MAX as u64 {
            return Err(ProbeError::InvalidConfig(format!(
                "{} global threads overflow 32-bit thread indices",
                self.global_threads()
            )));
        }
        Ok(())
    }
}

/// Device-reported duration of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DispatchTime {
    nanos: u64,
}

impl DispatchTime {
    /// From device nanoseconds.
    pub fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Nanoseconds.
    pub fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Microseconds (nanoseconds / 1000).
    pub fn as_micros_f64(&self) -> f64 {
        self.nanos as f64 / 1000.0
    }
}

/// Storage buffer of 32-bit words living on the device.
///
/// Dropping the buffer releases its device memory.
pub trait DeviceBuffer {
    /// Length in words.
    fn len(&self) -> usize;

    /// True for a zero-length buffer.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Debug label.
    fn label(&self) -> &str;

    /// Copy `data` into the buffer starting at word `offset`.
    fn write(&self, offset: usize, data: &[u32]) -> Result<()>;

    /// Copy the whole buffer back to the host.
    fn read(&self) -> Result<Vec<u32>>;

    /// Zero every word.
    fn clear(&self) -> Result<()>;

    /// Store a single word.
    fn store(&self, index: usize, value: u32) -> Result<()> {
        self.write(index, &[value])
    }

    /// Load a single word.
    fn load(&self, index: usize) -> Result<u32> {
        let words = self.read()?;
        words.get(index).copied().ok_or(ProbeError::BufferOverflow {
            required: index + 1,
            available: words.len(),
        })
    }
}

/// A kernel bound to its buffers and grid shape, ready to dispatch.
///
/// Dropping the program releases its pipeline objects; the bound buffers stay
/// owned by the caller.
pub trait KernelProgram {
    /// Dispatch and block until the device finishes.
    fn run(&mut self) -> Result<()>;

    /// Dispatch, block, and return the device-measured duration.
    fn run_timed(&mut self) -> Result<DispatchTime>;
}

/// Capability interface implemented by every backend.
pub trait ComputeDevice {
    /// Buffer type of this backend.
    type Buffer: DeviceBuffer;
    /// Program type of this backend.
    type Program: KernelProgram;

    /// Device limits.
    fn info(&self) -> &DeviceInfo;

    /// Allocate a zero-initialized buffer of `len` words.
    fn allocate(&self, len: usize, label: &str) -> Result<Self::Buffer>;

    /// Build a dispatchable program from `kernel` with `bindings`.
    fn create_program(
        &self,
        kernel: &KernelBinary,
        bindings: &Bindings<'_, Self::Buffer>,
        launch: LaunchConfig,
    ) -> Result<Self::Program>;

    /// Allocate a buffer holding `data`.
    fn allocate_init(&self, data: &[u32], label: &str) -> Result<Self::Buffer> {
        let buffer = self.allocate(data.len(), label)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            name: "test".to_string(),
            backend: "none".to_string(),
            max_workgroup_invocations: 256,
            max_workgroups_per_dimension: 65535,
            timestamp_queries: true,
        }
    }

    #[test]
    fn test_launch_check() {
        let ok = LaunchConfig {
            workgroup_size: 256,
            workgroups: 4,
        };
        assert!(ok.check(&info()).is_ok());
        assert_eq!(ok.global_threads(), 1024);

        let too_wide = LaunchConfig {
            workgroup_size: 512,
            workgroups: 4,
        };
        assert!(too_wide.check(&info()).unwrap_err().is_config_error());

        let empty = LaunchConfig {
            workgroup_size: 64,
            workgroups: 0,
        };
        assert!(empty.check(&info()).is_err());

        let too_many = LaunchConfig {
            workgroup_size: 64,
            workgroups: 70_000,
        };
        assert!(too_many.check(&info()).is_err());
    }

    #[test]
    fn test_dispatch_time_units() {
        let t = DispatchTime::from_nanos(2_500);
        assert_eq!(t.as_nanos(), 2_500);
        assert!((t.as_micros_f64() - 2.5).abs() < f64::EPSILON);
    }
}
