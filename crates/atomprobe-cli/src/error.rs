//! Error types for the atomprobe CLI.

use thiserror::Error;

use atomprobe_core::error::ProbeError;

/// CLI result type alias.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type.
#[derive(Error, Debug)]
pub enum CliError {
    /// IO error on the terminal.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Measurement or device failure.
    #[error("{0}")]
    Probe(#[from] ProbeError),

    /// Missing or conflicting arguments.
    #[error("Usage error: {0}")]
    Usage(String),

    /// Interactive input ended or could not be used.
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Interactive selection matched no device.
    #[error("No device selected")]
    NothingSelected,

    /// Feature not available.
    #[allow(dead_code)] // Only raised by builds without the `wgpu` feature
    #[error("Feature not available: {0}. Enable with --features {1}")]
    FeatureNotAvailable(String, String),
}
