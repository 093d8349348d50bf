//! Error types for atomprobe.

use thiserror::Error;

/// Result type alias for atomprobe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors raised while configuring, discovering, or measuring.
#[derive(Error, Debug)]
pub enum ProbeError {
    // ===== Configuration Errors =====
    /// A benchmark parameter is out of range. Raised before any device
    /// resource is allocated.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device index does not name an enumerated device.
    #[error("device {index} not found ({available} available)")]
    DeviceNotFound {
        /// Requested index.
        index: usize,
        /// Number of enumerated devices.
        available: usize,
    },

    // ===== Backend Errors =====
    /// Backend not compiled in or not present on this host.
    #[error("backend not available: {0}")]
    BackendUnavailable(String),

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    BackendError(String),

    /// Device refused an allocation.
    #[error("out of device memory: requested {requested} bytes for '{label}'")]
    OutOfDeviceMemory {
        /// Buffer label.
        label: String,
        /// Requested size in bytes.
        requested: usize,
    },

    /// Host data does not fit the device buffer.
    #[error("buffer overflow: need {required} words, buffer holds {available}")]
    BufferOverflow {
        /// Words required.
        required: usize,
        /// Words available.
        available: usize,
    },

    /// Host/device copy failed.
    #[error("transfer failed: {0}")]
    TransferError(String),

    /// Program creation or dispatch failed.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// The device produced no usable dispatch timing.
    #[error("dispatch timing unavailable: {0}")]
    TimingUnavailable(String),

    // ===== Kernel Errors =====
    /// Kernel artifact is malformed.
    #[error("invalid kernel binary: {0}")]
    InvalidKernel(String),

    /// Buffers were bound in an order the kernel does not expect.
    #[error("binding mismatch for '{kernel}': {reason}")]
    BindingMismatch {
        /// Kernel layout name.
        kernel: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// The kernel returned a value its protocol cannot produce.
    #[error("kernel contract violated: {0}")]
    KernelContractViolation(String),

    // ===== Measurement Errors =====
    /// The adaptive calibration loop hit its bound before a trial ran long
    /// enough.
    #[error(
        "calibration did not converge after {attempts} attempts \
         (last mean duration {last_mean_us:.1} us at {rmw_iters} iterations)"
    )]
    CalibrationExhausted {
        /// Attempts made.
        attempts: u32,
        /// Iteration count of the last attempt.
        rmw_iters: u32,
        /// Mean trial duration of the last attempt.
        last_mean_us: f64,
    },

    // ===== I/O Errors =====
    /// Reading a kernel artifact or config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Whether this error was raised before touching the device.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ProbeError::InvalidConfig(_) | ProbeError::DeviceNotFound { .. }
        )
    }

    /// Whether this error is a device resource failure.
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            ProbeError::OutOfDeviceMemory { .. }
                | ProbeError::BufferOverflow { .. }
                | ProbeError::TransferError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProbeError::DeviceNotFound {
            index: 3,
            available: 1,
        };
        assert_eq!(err.to_string(), "device 3 not found (1 available)");

        let err = ProbeError::InvalidConfig("contention must be at least 1".to_string());
        assert!(err.to_string().contains("contention"));
    }

    #[test]
    fn test_error_categories() {
        assert!(ProbeError::InvalidConfig(String::new()).is_config_error());
        assert!(!ProbeError::LaunchFailed(String::new()).is_config_error());
        assert!(ProbeError::OutOfDeviceMemory {
            label: "result".to_string(),
            requested: 4,
        }
        .is_resource_error());
    }
}
