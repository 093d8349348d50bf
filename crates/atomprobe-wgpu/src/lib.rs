//! WebGPU backend for atomprobe.
//!
//! Loads the contention and occupancy kernels as SPIR-V shader modules, binds
//! one storage buffer per layout role, and times dispatches with
//! timestamp queries where the adapter supports them (falling back to the
//! host clock otherwise).
//!
//! Adapters are indexed in `wgpu::Instance::enumerate_adapters` order.

#![warn(missing_docs)]

mod adapter;
mod device;
mod memory;
mod pipeline;
mod scope;

pub use adapter::{enumerate_adapters, is_wgpu_available, WgpuAdapter, WgpuAdapterInfo};
pub use device::WgpuDevice;
pub use memory::WgpuBuffer;
pub use pipeline::WgpuProgram;
