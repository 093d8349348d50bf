//! WebGPU adapter management.

use std::sync::Arc;

use atomprobe_core::device::DeviceInfo;
use atomprobe_core::error::{ProbeError, Result};

/// Adapter, device and queue opened for measurement.
pub struct WgpuAdapter {
    /// The wgpu instance.
    #[allow(dead_code)]
    instance: wgpu::Instance,
    /// The selected adapter.
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    /// The device.
    device: Arc<wgpu::Device>,
    /// The command queue.
    queue: Arc<wgpu::Queue>,
    /// Adapter info.
    info: wgpu::AdapterInfo,
    /// Whether `TIMESTAMP_QUERY` was granted.
    timestamps: bool,
}

impl WgpuAdapter {
    /// Open the adapter at `index` in enumeration order.
    ///
    /// Requests the adapter's own limits (so the full workgroup size is usable)
    /// and timestamp queries when the adapter supports them.
    pub async fn open(index: usize) -> Result<Self> {
        let instance = new_instance();
        let adapters = instance.enumerate_adapters(wgpu::Backends::all());
        let available = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(index)
            .ok_or(ProbeError::DeviceNotFound { index, available })?;

        let info = adapter.get_info();
        let timestamps = adapter
            .features()
            .contains(wgpu::Features::TIMESTAMP_QUERY);
        let required_features = if timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("atomprobe device"),
                    required_features,
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await
            .map_err(|e| ProbeError::BackendError(format!("Failed to create device: {}", e)))?;

        device.on_uncaptured_error(Box::new(|e| {
            tracing::error!("wgpu validation error: {}", e);
        }));

        tracing::info!(
            "Opened WebGPU adapter {}: {} ({:?}), timestamps={}",
            index,
            info.name,
            info.backend,
            timestamps
        );

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
            timestamps,
        })
    }

    /// Get the adapter name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Get the backend type.
    pub fn backend(&self) -> wgpu::Backend {
        self.info.backend
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the command queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Get device limits.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Whether dispatches can be timed on the device.
    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Limits in backend-neutral form.
    pub fn device_info(&self) -> DeviceInfo {
        let limits = self.limits();
        DeviceInfo {
            name: self.info.name.clone(),
            backend: format!("{:?}", self.info.backend),
            max_workgroup_invocations: limits
                .max_compute_invocations_per_workgroup
                .min(limits.max_compute_workgroup_size_x),
            max_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            timestamp_queries: self.timestamps,
        }
    }
}

fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Enumerate available adapters in the order [`WgpuAdapter::open`] indexes them.
pub fn enumerate_adapters() -> Vec<WgpuAdapterInfo> {
    new_instance()
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .enumerate()
        .map(|(index, adapter)| {
            let info = adapter.get_info();
            let limits = adapter.limits();
            WgpuAdapterInfo {
                index,
                name: info.name.clone(),
                backend: info.backend,
                device_type: info.device_type,
                max_workgroup_invocations: limits.max_compute_invocations_per_workgroup,
                timestamps: adapter
                    .features()
                    .contains(wgpu::Features::TIMESTAMP_QUERY),
            }
        })
        .collect()
}

/// Whether any adapter is present.
pub fn is_wgpu_available() -> bool {
    !enumerate_adapters().is_empty()
}

/// Information about a WebGPU adapter.
#[derive(Debug, Clone)]
pub struct WgpuAdapterInfo {
    /// Enumeration index.
    pub index: usize,
    /// Adapter name.
    pub name: String,
    /// Backend type (Vulkan, Metal, DX12, etc.).
    pub backend: wgpu::Backend,
    /// Device type (discrete GPU, integrated, etc.).
    pub device_type: wgpu::DeviceType,
    /// Maximum invocations per workgroup.
    pub max_workgroup_invocations: u32,
    /// Whether timestamp queries are supported.
    pub timestamps: bool,
}
