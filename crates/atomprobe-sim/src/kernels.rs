//! Minimal kernel modules for running without artifacts on disk.
//!
//! The simulated device never executes SPIR-V, but the engine still patches
//! `LocalSize` and checks entry points, so these modules carry a valid header
//! and a single `OpExecutionMode ... LocalSize` instruction.

use atomprobe_core::error::Result;
use atomprobe_core::kernel::{KernelBinary, KernelSet, SPIRV_MAGIC};

const VERSION_1_0: u32 = 0x0001_0000;

/// Header plus `OpExecutionMode %1 LocalSize <x> 1 1`.
pub fn stub_module(local_size_x: u32) -> Vec<u32> {
    vec![
        SPIRV_MAGIC,
        VERSION_1_0,
        0,
        2,
        0,
        (6 << 16) | 16,
        1,
        17,
        local_size_x,
        1,
        1,
    ]
}

/// Both kernels as stub modules.
pub fn builtin_kernels() -> Result<KernelSet> {
    Ok(KernelSet {
        contention: KernelBinary::from_words(stub_module(1), KernelSet::CONTENTION_ENTRY)?,
        occupancy: Some(KernelBinary::from_words(
            stub_module(1),
            KernelSet::OCCUPANCY_ENTRY,
        )?),
    })
}
