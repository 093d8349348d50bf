//! # atomprobe core
//!
//! Host-side measurement logic for GPU atomic read-modify-write contention
//! and true occupancy discovery.
//!
//! ## Core Abstractions
//!
//! - [`ComputeDevice`] - capability interface every backend implements
//! - [`AccessPattern`] - contention/padding placement of RMW targets
//! - [`ResultValidator`] - expected-count check of the result buffer
//! - [`OccupancyDiscovery`] - ticket-lock occupancy probe with max-reduction
//! - [`ContentionBenchmark`] - calibration, timed trials, and reporting
//! - [`Bindings`] - order-checked buffer bindings for each kernel layout
//!
//! ## Example
//!
//! ```ignore
//! use atomprobe_core::prelude::*;
//!
//! let kernels = KernelSet::load_dir("kernels")?;
//! let engine = ContentionBenchmark::new(&device, kernels);
//! let report = engine.run(&BenchConfig::new().with_contention(4).with_padding(2))?;
//! println!("{report}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bench;
pub mod binding;
pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod occupancy;
pub mod pattern;
pub mod report;
pub mod sweep;
pub mod validate;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bench::{ContentionBenchmark, ResolvedGrid, TrialStats};
    pub use crate::binding::{
        Bindings, BindingsBuilder, BufferRole, KernelKind, KernelLayout, CONTENTION_LAYOUT,
        OCCUPANCY_LAYOUT,
    };
    pub use crate::config::{BenchConfig, CalibrationConfig};
    pub use crate::device::{
        ComputeDevice, DeviceBuffer, DeviceInfo, DispatchTime, KernelProgram, LaunchConfig,
    };
    pub use crate::error::{ProbeError, Result};
    pub use crate::kernel::{KernelBinary, KernelSet, SPIRV_MAGIC};
    pub use crate::occupancy::{OccupancyDiscovery, OccupancyParams, OccupancyReport};
    pub use crate::pattern::AccessPattern;
    pub use crate::report::{BenchmarkReport, CalibrationStep, SweepCell, SweepGrid};
    pub use crate::sweep::SweepPlan;
    pub use crate::validate::{ResultValidator, ValidationReport};
}

// Re-exports for convenience
pub use bench::ContentionBenchmark;
pub use binding::{Bindings, BufferRole, KernelKind, KernelLayout};
pub use config::BenchConfig;
pub use device::{ComputeDevice, DeviceBuffer, DeviceInfo, DispatchTime, KernelProgram, LaunchConfig};
pub use error::{ProbeError, Result};
pub use kernel::{KernelBinary, KernelSet};
pub use occupancy::{OccupancyDiscovery, OccupancyParams, OccupancyReport};
pub use pattern::AccessPattern;
pub use report::BenchmarkReport;
pub use validate::{ResultValidator, ValidationReport};
