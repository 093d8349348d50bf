//! Placement of RMW targets in the result buffer.
//!
//! Thread `i` targets slot `floor(i / contention) * padding`: every run of
//! `contention` consecutive threads shares one slot, and neighbouring groups
//! sit `padding` slots apart.

use crate::error::{ProbeError, Result};

/// Contention/padding addressing for one problem size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPattern {
    global_threads: u32,
    contention: u32,
    padding: u32,
}

impl AccessPattern {
    /// Validate parameters. Fails on a zero contention or padding, or when the
    /// highest slot index does not fit the kernel's 32-bit index type.
    pub fn new(global_threads: u32, contention: u32, padding: u32) -> Result<Self> {
        if contention == 0 {
            return Err(ProbeError::InvalidConfig(
                "contention must be at least 1".to_string(),
            ));
        }
        if padding == 0 {
            return Err(ProbeError::InvalidConfig(
                "padding must be at least 1".to_string(),
            ));
        }
        if global_threads == 0 {
            return Err(ProbeError::InvalidConfig(
                "global thread count must be at least 1".to_string(),
            ));
        }

        let groups = (global_threads as u64).div_ceil(contention as u64);
        if groups * padding as u64 > u32::MAX as u64 {
            return Err(ProbeError::InvalidConfig(format!(
                "{} groups at padding {} overflow 32-bit slot indices",
                groups, padding
            )));
        }

        Ok(Self {
            global_threads,
            contention,
            padding,
        })
    }

    /// Slot targeted by `thread`.
    #[inline]
    pub fn slot(&self, thread: u32) -> u32 {
        (thread / self.contention) * self.padding
    }

    /// Number of global threads.
    pub fn global_threads(&self) -> u32 {
        self.global_threads
    }

    /// Threads per shared slot.
    pub fn contention(&self) -> u32 {
        self.contention
    }

    /// Stride between targeted slots.
    pub fn padding(&self) -> u32 {
        self.padding
    }

    /// Number of distinct targeted slots (the last one may be a partial group).
    pub fn groups(&self) -> u32 {
        self.global_threads.div_ceil(self.contention)
    }

    /// Threads mapped onto group `group`.
    pub fn threads_in_group(&self, group: u32) -> u32 {
        let start = group.saturating_mul(self.contention);
        if start >= self.global_threads {
            0
        } else {
            (self.global_threads - start).min(self.contention)
        }
    }

    /// Result buffer length in words.
    ///
    /// Equal to `global_threads * padding / contention` whenever contention
    /// divides the thread count; rounds the group count up otherwise so the
    /// trailing partial group stays in range.
    pub fn result_len(&self) -> usize {
        self.groups() as usize * self.padding as usize
    }

    /// Materialize the per-thread slot table written to the access-pattern
    /// buffer.
    pub fn generate(&self) -> Vec<u32> {
        (0..self.global_threads).map(|i| self.slot(i)).collect()
    }
}

/// Identity pattern used by occupancy discovery (`i -> i`).
pub fn identity(len: u32) -> Vec<u32> {
    (0..len).collect()
}
