//! SPIR-V compute pipelines and timed dispatch.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use atomprobe_core::binding::Bindings;
use atomprobe_core::device::{DispatchTime, KernelProgram, LaunchConfig};
use atomprobe_core::error::{ProbeError, Result};
use atomprobe_core::kernel::KernelBinary;

use crate::adapter::WgpuAdapter;
use crate::memory::{read_mapped, WgpuBuffer};
use crate::scope::{guarded, Creation};

/// Begin/end timestamp pair around the compute pass.
struct PassTimer {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    /// Nanoseconds per timestamp tick.
    period: f32,
}

const TIMER_BYTES: u64 = 2 * std::mem::size_of::<u64>() as u64;

impl PassTimer {
    fn new(adapter: &WgpuAdapter) -> Self {
        let device = adapter.device();
        Self {
            query_set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("atomprobe timestamps"),
                ty: wgpu::QueryType::Timestamp,
                count: 2,
            }),
            resolve: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("atomprobe timestamp resolve"),
                size: TIMER_BYTES,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("atomprobe timestamp readback"),
                size: TIMER_BYTES,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            period: adapter.queue().get_timestamp_period(),
        }
    }
}

/// Compiled kernel bound to its buffers.
pub struct WgpuProgram {
    /// The wgpu pipeline.
    pipeline: wgpu::ComputePipeline,
    /// Bind group in layout order.
    bind_group: wgpu::BindGroup,
    /// Bound buffers, kept alive for the bind group.
    #[allow(dead_code)]
    buffers: Vec<WgpuBuffer>,
    /// Grid shape.
    launch: LaunchConfig,
    /// Device-side timer, when supported.
    timer: Option<PassTimer>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    label: String,
}

impl WgpuProgram {
    /// Build the pipeline for `kernel` with one read-write storage binding per
    /// role in `bindings`.
    pub fn new(
        adapter: &WgpuAdapter,
        kernel: &KernelBinary,
        bindings: &Bindings<'_, WgpuBuffer>,
        launch: LaunchConfig,
    ) -> Result<Self> {
        let device = adapter.device();
        let label = bindings.layout().name.to_string();

        let (pipeline, bind_group) = guarded(
            device,
            Creation::Program {
                kernel: label.as_str(),
            },
            || {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label.as_str()),
                    source: wgpu::ShaderSource::SpirV(Cow::Borrowed(kernel.words())),
                });

                let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
                    .iter()
                    .map(|(slot, _, _)| wgpu::BindGroupLayoutEntry {
                        binding: slot,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    })
                    .collect();
                let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(label.as_str()),
                    entries: &layout_entries,
                });

                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(label.as_str()),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label.as_str()),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: kernel.entry_point(),
                });

                let entries: Vec<wgpu::BindGroupEntry> = bindings
                    .iter()
                    .map(|(slot, _, buffer)| wgpu::BindGroupEntry {
                        binding: slot,
                        resource: buffer.as_entire_binding(),
                    })
                    .collect();
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(label.as_str()),
                    layout: &bind_group_layout,
                    entries: &entries,
                });
                (pipeline, bind_group)
            },
        )?;

        let timer = if adapter.has_timestamps() {
            Some(PassTimer::new(adapter))
        } else {
            tracing::warn!(
                "{} has no timestamp queries; timing '{}' with the host clock",
                adapter.name(),
                label
            );
            None
        };

        Ok(Self {
            pipeline,
            bind_group,
            buffers: bindings.buffers().iter().map(|b| (*b).clone()).collect(),
            launch,
            timer,
            device: Arc::clone(device),
            queue: Arc::clone(adapter.queue()),
            label,
        })
    }

    /// Record and submit one dispatch, then block until it completes.
    fn dispatch(&self, timed: bool) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(self.label.as_str()),
            });

        let timer = self.timer.as_ref().filter(|_| timed);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(self.label.as_str()),
                timestamp_writes: timer.map(|t| wgpu::ComputePassTimestampWrites {
                    query_set: &t.query_set,
                    beginning_of_pass_write_index: Some(0),
                    end_of_pass_write_index: Some(1),
                }),
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(self.launch.workgroups, 1, 1);
        }

        if let Some(t) = timer {
            encoder.resolve_query_set(&t.query_set, 0..2, &t.resolve, 0);
            encoder.copy_buffer_to_buffer(&t.resolve, 0, &t.readback, 0, TIMER_BYTES);
        }

        self.queue.submit(Some(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl KernelProgram for WgpuProgram {
    fn run(&mut self) -> Result<()> {
        self.dispatch(false);
        Ok(())
    }

    fn run_timed(&mut self) -> Result<DispatchTime> {
        match &self.timer {
            Some(timer) => {
                self.dispatch(true);
                let (begin, end) = read_mapped(&self.device, &timer.readback, |bytes| {
                    let ticks: &[u64] = bytemuck::cast_slice(bytes);
                    (ticks[0], ticks[1])
                })?;
                if end < begin {
                    return Err(ProbeError::TimingUnavailable(format!(
                        "end timestamp {} precedes begin {}",
                        end, begin
                    )));
                }
                let nanos = (end - begin) as f64 * timer.period as f64;
                Ok(DispatchTime::from_nanos(nanos.round() as u64))
            }
            None => {
                let start = Instant::now();
                self.dispatch(false);
                Ok(DispatchTime::from_nanos(start.elapsed().as_nanos() as u64))
            }
        }
    }
}
