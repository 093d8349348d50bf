//! Simulated compute device.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use atomprobe_core::binding::Bindings;
use atomprobe_core::device::{ComputeDevice, DeviceInfo, LaunchConfig};
use atomprobe_core::error::{ProbeError, Result};
use atomprobe_core::kernel::KernelBinary;

use crate::config::SimConfig;
use crate::memory::{MemoryLedger, SimBuffer};
use crate::program::SimProgram;

/// In-process device implementing [`ComputeDevice`].
///
/// Kernel binaries are validated but not executed; the binding layout picks
/// the host-side body that reproduces the kernel's effect.
pub struct SimDevice {
    config: Arc<SimConfig>,
    info: DeviceInfo,
    ledger: Arc<MemoryLedger>,
    rng: Arc<Mutex<StdRng>>,
}

impl SimDevice {
    /// Device with default parameters.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Device with `config`.
    pub fn with_config(config: SimConfig) -> Self {
        info!(
            "Initializing simulated device '{}' ({} resident workgroups)",
            config.name, config.resident_workgroups
        );
        let info = DeviceInfo {
            name: config.name.clone(),
            backend: "sim".to_string(),
            max_workgroup_invocations: config.max_workgroup_invocations,
            max_workgroups_per_dimension: config.max_workgroups_per_dimension,
            timestamp_queries: true,
        };
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(config.seed))),
            config: Arc::new(config),
            info,
            ledger: Arc::new(MemoryLedger::default()),
        }
    }

    /// Parameters in use.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Buffers currently allocated and not yet dropped.
    pub fn live_buffers(&self) -> usize {
        self.ledger.live_buffers()
    }

    /// Words currently allocated.
    pub fn live_words(&self) -> usize {
        self.ledger.live_words()
    }

    /// Allocation attempts so far.
    pub fn allocations(&self) -> u64 {
        self.ledger.allocations()
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeDevice for SimDevice {
    type Buffer = SimBuffer;
    type Program = SimProgram;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn allocate(&self, len: usize, label: &str) -> Result<SimBuffer> {
        let ordinal = self.ledger.next_ordinal();
        let oom = || ProbeError::OutOfDeviceMemory {
            label: label.to_string(),
            requested: len * std::mem::size_of::<u32>(),
        };
        if self.config.fail_allocation == Some(ordinal) {
            return Err(oom());
        }
        if let Some(limit) = self.config.memory_words {
            if self.ledger.live_words() + len > limit {
                return Err(oom());
            }
        }
        debug!(label, len, ordinal, "sim allocate");
        Ok(SimBuffer::new(len, label, Arc::clone(&self.ledger)))
    }

    fn create_program(
        &self,
        kernel: &KernelBinary,
        bindings: &Bindings<'_, SimBuffer>,
        launch: LaunchConfig,
    ) -> Result<SimProgram> {
        launch.check(&self.info)?;
        let layout = bindings.layout();
        if kernel.entry_point() != layout.name {
            return Err(ProbeError::BindingMismatch {
                kernel: layout.name,
                reason: format!("kernel entry point is '{}'", kernel.entry_point()),
            });
        }
        if let Some((x, _, _)) = kernel.local_size() {
            if x != launch.workgroup_size {
                return Err(ProbeError::LaunchFailed(format!(
                    "kernel declares LocalSize {} but launch uses {}",
                    x, launch.workgroup_size
                )));
            }
        }

        let buffers = bindings.buffers().iter().map(|b| (*b).clone()).collect();
        Ok(SimProgram::new(
            layout.kind,
            buffers,
            launch,
            Arc::clone(&self.config),
            Arc::clone(&self.rng),
        ))
    }
}
