//! [`ComputeDevice`] over a wgpu adapter.

use atomprobe_core::binding::Bindings;
use atomprobe_core::device::{ComputeDevice, DeviceInfo, LaunchConfig};
use atomprobe_core::error::{ProbeError, Result};
use atomprobe_core::kernel::KernelBinary;

use crate::adapter::WgpuAdapter;
use crate::memory::WgpuBuffer;
use crate::pipeline::WgpuProgram;

/// A GPU opened through wgpu.
pub struct WgpuDevice {
    adapter: WgpuAdapter,
    info: DeviceInfo,
}

impl WgpuDevice {
    /// Open the adapter at `index`.
    pub async fn open(index: usize) -> Result<Self> {
        let adapter = WgpuAdapter::open(index).await?;
        let info = adapter.device_info();
        Ok(Self { adapter, info })
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &WgpuAdapter {
        &self.adapter
    }
}

impl ComputeDevice for WgpuDevice {
    type Buffer = WgpuBuffer;
    type Program = WgpuProgram;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn allocate(&self, len: usize, label: &str) -> Result<WgpuBuffer> {
        WgpuBuffer::new(&self.adapter, len, label)
    }

    fn create_program(
        &self,
        kernel: &KernelBinary,
        bindings: &Bindings<'_, WgpuBuffer>,
        launch: LaunchConfig,
    ) -> Result<WgpuProgram> {
        launch.check(&self.info)?;
        let layout = bindings.layout();
        if kernel.entry_point() != layout.name {
            return Err(ProbeError::BindingMismatch {
                kernel: layout.name,
                reason: format!("kernel entry point is '{}'", kernel.entry_point()),
            });
        }
        WgpuProgram::new(&self.adapter, kernel, bindings, launch)
    }
}
