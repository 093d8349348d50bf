//! Buffer binding contracts between host and kernel.
//!
//! Each kernel expects its storage buffers at fixed binding slots. A
//! [`KernelLayout`] names those slots by role, and [`Bindings`] only accepts
//! buffers in exactly that order, so a host-side reordering fails loudly
//! instead of silently feeding the wrong buffer to the device.

use std::fmt;

use crate::error::{ProbeError, Result};

/// Role of a storage buffer in a kernel's binding list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// RMW target counters.
    Result,
    /// Scalar iteration count.
    IterationCount,
    /// Per-thread target slot table.
    AccessPattern,
    /// Critical-section occupant counter.
    OccupancyCount,
    /// Flag gating how long arrivals may still be counted.
    PollOpen,
    /// One word per workgroup recording entry into the critical section.
    WorkgroupScratch,
    /// Ticket currently admitted by the lock.
    NowServing,
    /// Next ticket to hand out.
    NextTicket,
}

impl BufferRole {
    /// Short name used for buffer labels.
    pub fn label(&self) -> &'static str {
        match self {
            BufferRole::Result => "result",
            BufferRole::IterationCount => "rmw-iters",
            BufferRole::AccessPattern => "access-pattern",
            BufferRole::OccupancyCount => "occupancy-count",
            BufferRole::PollOpen => "poll-open",
            BufferRole::WorkgroupScratch => "workgroup-scratch",
            BufferRole::NowServing => "now-serving",
            BufferRole::NextTicket => "next-ticket",
        }
    }
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which protocol a layout drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    /// Relaxed fetch-add loop over the access pattern.
    Contention,
    /// Ticket-lock occupancy counter.
    OccupancyDiscovery,
}

/// Ordered binding contract of one kernel.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelLayout {
    /// Layout name (for diagnostics).
    pub name: &'static str,
    /// Protocol implemented by kernels using this layout.
    pub kind: KernelKind,
    /// Roles in binding-slot order.
    pub roles: &'static [BufferRole],
}

/// Contention kernel: `{result, iteration-count, access-pattern}`.
pub static CONTENTION_LAYOUT: KernelLayout = KernelLayout {
    name: "rmw_test",
    kind: KernelKind::Contention,
    roles: &[
        BufferRole::Result,
        BufferRole::IterationCount,
        BufferRole::AccessPattern,
    ],
};

/// Occupancy kernel: `{result, iteration-count, access-pattern,
/// occupancy-count, poll-open, workgroup-scratch, now-serving, next-ticket}`.
pub static OCCUPANCY_LAYOUT: KernelLayout = KernelLayout {
    name: "occupancy_discovery",
    kind: KernelKind::OccupancyDiscovery,
    roles: &[
        BufferRole::Result,
        BufferRole::IterationCount,
        BufferRole::AccessPattern,
        BufferRole::OccupancyCount,
        BufferRole::PollOpen,
        BufferRole::WorkgroupScratch,
        BufferRole::NowServing,
        BufferRole::NextTicket,
    ],
};

/// Buffers bound to a layout, in slot order.
pub struct Bindings<'a, B> {
    layout: &'static KernelLayout,
    buffers: Vec<&'a B>,
}

impl<'a, B> Bindings<'a, B> {
    /// Start binding against `layout`.
    pub fn builder(layout: &'static KernelLayout) -> BindingsBuilder<'a, B> {
        BindingsBuilder {
            layout,
            buffers: Vec::with_capacity(layout.roles.len()),
        }
    }

    /// Layout these bindings satisfy.
    pub fn layout(&self) -> &'static KernelLayout {
        self.layout
    }

    /// Buffers in slot order.
    pub fn buffers(&self) -> &[&'a B] {
        &self.buffers
    }

    /// `(slot, role, buffer)` triples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, BufferRole, &'a B)> + '_ {
        self.layout
            .roles
            .iter()
            .zip(self.buffers.iter())
            .enumerate()
            .map(|(slot, (&role, &buffer))| (slot as u32, role, buffer))
    }

    /// Buffer bound to `role`.
    pub fn get(&self, role: BufferRole) -> Option<&'a B> {
        self.layout
            .roles
            .iter()
            .position(|&r| r == role)
            .map(|slot| self.buffers[slot])
    }
}

/// Order-checked builder for [`Bindings`].
pub struct BindingsBuilder<'a, B> {
    layout: &'static KernelLayout,
    buffers: Vec<&'a B>,
}

impl<'a, B> BindingsBuilder<'a, B> {
    /// Bind the next slot; `role` must be the one the layout expects there.
    pub fn bind(mut self, role: BufferRole, buffer: &'a B) -> Result<Self> {
        let slot = self.buffers.len();
        match self.layout.roles.get(slot) {
            Some(&expected) if expected == role => {
                self.buffers.push(buffer);
                Ok(self)
            }
            Some(&expected) => Err(ProbeError::BindingMismatch {
                kernel: self.layout.name,
                reason: format!("slot {} expects {}, got {}", slot, expected, role),
            }),
            None => Err(ProbeError::BindingMismatch {
                kernel: self.layout.name,
                reason: format!(
                    "layout has {} slots, extra buffer {} bound",
                    self.layout.roles.len(),
                    role
                ),
            }),
        }
    }

    /// Finish; every slot must be bound.
    pub fn finish(self) -> Result<Bindings<'a, B>> {
        if self.buffers.len() != self.layout.roles.len() {
            let missing = self.layout.roles[self.buffers.len()..]
                .iter()
                .map(|r| r.label())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ProbeError::BindingMismatch {
                kernel: self.layout.name,
                reason: format!("unbound roles: {}", missing),
            });
        }
        Ok(Bindings {
            layout: self.layout,
            buffers: self.buffers,
        })
    }
}
