//! Error scopes around resource creation.
//!
//! wgpu reports creation failures asynchronously; without a scope they only
//! reach the device's uncaptured-error handler and the returned handle is
//! silently invalid.

use atomprobe_core::error::{ProbeError, Result};

/// What was being created, for error mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Creation<'a> {
    /// A storage or staging buffer.
    Buffer { label: &'a str, bytes: u64 },
    /// Shader module, layouts, pipeline and bind group of one kernel.
    Program { kernel: &'a str },
}

/// Run `f` inside out-of-memory and validation error scopes.
///
/// Both scopes are popped even when the inner one reports an error; an
/// out-of-memory error wins over a validation error.
pub(crate) fn guarded<T>(
    device: &wgpu::Device,
    what: Creation<'_>,
    f: impl FnOnce() -> T,
) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());

    match oom.or(validation) {
        Some(err) => Err(map_error(what, err)),
        None => Ok(value),
    }
}

/// Translate a captured wgpu error for `what`.
pub(crate) fn map_error(what: Creation<'_>, err: wgpu::Error) -> ProbeError {
    match (what, err) {
        (Creation::Buffer { label, bytes }, wgpu::Error::OutOfMemory { .. }) => {
            ProbeError::OutOfDeviceMemory {
                label: label.to_string(),
                requested: bytes as usize,
            }
        }
        (Creation::Buffer { label, .. }, other) => {
            ProbeError::BackendError(format!("buffer '{}': {}", label, other))
        }
        (Creation::Program { kernel }, wgpu::Error::OutOfMemory { .. }) => {
            ProbeError::OutOfDeviceMemory {
                label: kernel.to_string(),
                requested: 0,
            }
        }
        (Creation::Program { kernel }, other) => {
            ProbeError::LaunchFailed(format!("kernel '{}' rejected by wgpu: {}", kernel, other))
        }
    }
}
