//! # atomprobe
//!
//! GPU atomic read-modify-write contention benchmark with true occupancy
//! discovery.
//!
//! A measurement assigns every global thread a target word in a result
//! buffer: `contention` consecutive threads share one target and targets sit
//! `padding` words apart. Each thread performs `rmw_iters` relaxed fetch-adds
//! on its target; the host times the dispatch, reports throughput in atomic
//! operations per microsecond, and checks every target holds exactly
//! `rmw_iters * contention`.
//!
//! The workgroup count can be given or discovered: a ticket-lock kernel counts
//! how many workgroups are actually co-resident, repeated over several trials
//! and reduced by maximum.
//!
//! ## Quick Start
//!
//! ```ignore
//! use atomprobe::prelude::*;
//!
//! let device = SimDevice::new();
//! let engine = ContentionBenchmark::new(&device, atomprobe::sim::builtin_kernels()?);
//! let report = engine.run(
//!     &BenchConfig::new()
//!         .with_contention(4)
//!         .with_padding(2)
//!         .with_workgroup_size(64)
//!         .with_workgroups(4),
//! )?;
//! println!("{report}");
//! ```
//!
//! ## Backends
//!
//! - **Sim** - host-side simulation with fault injection (always available)
//! - **WebGPU** - Vulkan/Metal/DX12 via wgpu (requires `wgpu` feature)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(hidden_glob_reexports)]

// Re-export core types
pub use atomprobe_core::*;

// Simulated backend (always available)
pub use atomprobe_sim as sim;
pub use atomprobe_sim::SimDevice;

#[cfg(feature = "wgpu")]
pub use atomprobe_wgpu as wgpu;
#[cfg(feature = "wgpu")]
pub use atomprobe_wgpu::WgpuDevice;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use atomprobe_core::prelude::*;
    pub use atomprobe_sim::{SimConfig, SimDevice, SimFault};

    #[cfg(feature = "wgpu")]
    pub use atomprobe_wgpu::WgpuDevice;
}

/// Check availability of backends at runtime.
pub mod availability {
    /// Check if WebGPU is available.
    pub fn wgpu() -> bool {
        #[cfg(feature = "wgpu")]
        {
            atomprobe_wgpu::is_wgpu_available()
        }
        #[cfg(not(feature = "wgpu"))]
        {
            false
        }
    }
}
