//! WebGPU storage buffers.

use std::sync::Arc;

use atomprobe_core::device::DeviceBuffer;
use atomprobe_core::error::{ProbeError, Result};

use crate::adapter::WgpuAdapter;
use crate::scope::{guarded, Creation};

const WORD: u64 = std::mem::size_of::<u32>() as u64;

/// Storage buffer of `u32` words.
///
/// Clones share the same device allocation, which wgpu frees when the last
/// handle is dropped.
#[derive(Clone)]
pub struct WgpuBuffer {
    /// The wgpu buffer.
    buffer: Arc<wgpu::Buffer>,
    /// Length in words.
    len: usize,
    /// Debug label.
    label: String,
    /// Reference to device.
    device: Arc<wgpu::Device>,
    /// Reference to queue.
    queue: Arc<wgpu::Queue>,
}

impl WgpuBuffer {
    /// Create a zero-initialized storage buffer of `len` words.
    pub fn new(adapter: &WgpuAdapter, len: usize, label: &str) -> Result<Self> {
        // Zero-sized bindings are invalid; keep one padding word.
        let size = len.max(1) as u64 * WORD;
        let limits = adapter.limits();
        if size > limits.max_buffer_size || size > limits.max_storage_buffer_binding_size as u64
        {
            return Err(ProbeError::OutOfDeviceMemory {
                label: label.to_string(),
                requested: size as usize,
            });
        }

        // wgpu zero-initializes buffers created without mapping.
        let buffer = guarded(
            adapter.device(),
            Creation::Buffer { label, bytes: size },
            || {
                adapter.device().create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                })
            },
        )?;

        Ok(Self {
            buffer: Arc::new(buffer),
            len,
            label: label.to_string(),
            device: Arc::clone(adapter.device()),
            queue: Arc::clone(adapter.queue()),
        })
    }

    /// Get the underlying wgpu buffer.
    pub fn inner(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Create a binding for this buffer.
    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

impl DeviceBuffer for WgpuBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn write(&self, offset: usize, data: &[u32]) -> Result<()> {
        let end = offset + data.len();
        if end > self.len {
            return Err(ProbeError::BufferOverflow {
                required: end,
                available: self.len,
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        self.queue
            .write_buffer(&self.buffer, offset as u64 * WORD, bytemuck::cast_slice(data));
        Ok(())
    }

    fn read(&self) -> Result<Vec<u32>> {
        if self.len == 0 {
            return Ok(Vec::new());
        }
        let size = self.len as u64 * WORD;

        // Create a staging buffer for reading
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("atomprobe staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("atomprobe readback"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let words = read_mapped(&self.device, &staging, |bytes| {
            bytemuck::cast_slice::<u8, u32>(bytes).to_vec()
        })?;
        Ok(words)
    }

    fn clear(&self) -> Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("atomprobe clear"),
            });
        encoder.clear_buffer(&self.buffer, 0, None);
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

/// Map `staging` for reading, block until the device is idle, and hand the
/// mapped bytes to `f`.
pub(crate) fn read_mapped<T>(
    device: &wgpu::Device,
    staging: &wgpu::Buffer,
    f: impl FnOnce(&[u8]) -> T,
) -> Result<T> {
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| ProbeError::TransferError(format!("Channel error: {}", e)))?
        .map_err(|e| ProbeError::TransferError(format!("Map error: {}", e)))?;

    let value = {
        let mapped = slice.get_mapped_range();
        f(&mapped)
    };
    staging.unmap();
    Ok(value)
}
