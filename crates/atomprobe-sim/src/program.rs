//! Host-side kernel bodies.
//!
//! A [`SimProgram`] reproduces the observable effect of the two kernel
//! protocols on the bound buffers, then charges the dispatch to the device's
//! [`TimingModel`](crate::config::TimingModel).

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

use atomprobe_core::binding::KernelKind;
use atomprobe_core::device::{DeviceBuffer, DispatchTime, KernelProgram, LaunchConfig};
use atomprobe_core::error::{ProbeError, Result};

use crate::config::{SimConfig, SimFault};
use crate::memory::SimBuffer;

/// A kernel bound to simulated buffers.
pub struct SimProgram {
    kind: KernelKind,
    buffers: Vec<SimBuffer>,
    launch: LaunchConfig,
    config: Arc<SimConfig>,
    rng: Arc<Mutex<StdRng>>,
    dispatches: u64,
}

impl SimProgram {
    pub(crate) fn new(
        kind: KernelKind,
        buffers: Vec<SimBuffer>,
        launch: LaunchConfig,
        config: Arc<SimConfig>,
        rng: Arc<Mutex<StdRng>>,
    ) -> Self {
        Self {
            kind,
            buffers,
            launch,
            config,
            rng,
            dispatches: 0,
        }
    }

    /// Dispatches so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    fn dispatch(&mut self) -> Result<u64> {
        self.dispatches += 1;
        let nanos = match self.kind {
            KernelKind::Contention => self.rmw_loop()?,
            KernelKind::OccupancyDiscovery => self.ticket_lock()?,
        };
        if matches!(self.config.fault, Some(SimFault::FrozenClock)) {
            return Ok(0);
        }
        Ok(nanos)
    }

    /// Relaxed fetch-add of `rmw_iters` by every thread to its pattern slot.
    fn rmw_loop(&self) -> Result<u64> {
        let [result, iters, pattern] = match self.buffers.as_slice() {
            [a, b, c] => [a, b, c],
            other => {
                return Err(ProbeError::LaunchFailed(format!(
                    "contention kernel bound to {} buffers",
                    other.len()
                )))
            }
        };

        let rmw_iters = iters.load(0)?;
        let table = pattern.read()?;
        let threads = self.launch.global_threads() as usize;
        if table.len() < threads {
            return Err(ProbeError::BufferOverflow {
                required: threads,
                available: table.len(),
            });
        }

        let drop_rate = match self.config.fault {
            Some(SimFault::LostUpdates { rate }) => rate.clamp(0.0, 1.0),
            _ => 0.0,
        };

        let mut slots = result.lock();
        let mut hits = vec![0u64; slots.len()];
        let mut rng = self.rng.lock();
        for (tid, &slot) in table[..threads].iter().enumerate() {
            let slot = slot as usize;
            if slot >= slots.len() {
                return Err(ProbeError::LaunchFailed(format!(
                    "thread {} targets slot {} past a {}-word result buffer",
                    tid,
                    slot,
                    slots.len()
                )));
            }
            hits[slot] += 1;
            if drop_rate > 0.0 && rng.gen_bool(drop_rate) {
                continue;
            }
            slots[slot] = slots[slot].wrapping_add(rmw_iters);
        }

        let hottest = hits.iter().copied().max().unwrap_or(0);
        let timing = self.config.timing;
        let total_ops = threads as f64 * rmw_iters as f64;
        let serialized = hottest as f64 * rmw_iters as f64;
        let nanos = timing.launch_overhead_ns as f64
            + total_ops * timing.ns_per_op / timing.lanes.max(1) as f64
            + serialized * timing.ns_per_contended_op;
        Ok(nanos.round() as u64)
    }

    /// Ticket-lock occupancy protocol.
    ///
    /// Only the first wave of resident workgroups can arrive while the poll is
    /// open; of those, the ones arriving within `poll_window` ticks of the
    /// first arrival are counted. Later waves are scheduled only after
    /// residents exit, which happens after the poll has closed.
    fn ticket_lock(&self) -> Result<u64> {
        let [result, iters, pattern, count, poll_open, scratch, now_serving, next_ticket] =
            match self.buffers.as_slice() {
                [a, b, c, d, e, f, g, h] => [a, b, c, d, e, f, g, h],
                other => {
                    return Err(ProbeError::LaunchFailed(format!(
                        "occupancy kernel bound to {} buffers",
                        other.len()
                    )))
                }
            };

        let dispatched = self.launch.workgroups;
        let first_ticket = next_ticket.load(0)?;
        if now_serving.load(0)? != first_ticket {
            return Err(ProbeError::LaunchFailed(
                "ticket lock starts with now-serving ahead of next-ticket".to_string(),
            ));
        }

        let resident = self.config.resident_workgroups.clamp(1, dispatched);
        let mut arrivals: Vec<(u32, u32)> = {
            let mut rng = self.rng.lock();
            (0..resident)
                .map(|wg| (rng.gen_range(0..=self.config.arrival_jitter), wg))
                .collect()
        };
        // Tickets are handed out in arrival order.
        arrivals.sort_unstable();

        let open = poll_open.load(0)? != 0;
        let close_at = arrivals[0].0.saturating_add(self.config.poll_window);
        let stalled = matches!(self.config.fault, Some(SimFault::StalledOccupancy));
        let counted: Vec<u32> = arrivals
            .iter()
            .take_while(|(t, _)| open && !stalled && *t <= close_at)
            .map(|&(_, wg)| wg)
            .collect();

        {
            let mut flags = scratch.lock();
            for &wg in &counted {
                if let Some(flag) = flags.get_mut(wg as usize) {
                    *flag = 1;
                }
            }
        }
        let occupants = count.load(0)?.wrapping_add(counted.len() as u32);
        count.store(0, occupants)?;
        poll_open.store(0, 0)?;
        next_ticket.store(0, first_ticket.wrapping_add(dispatched))?;
        now_serving.store(0, first_ticket.wrapping_add(dispatched))?;

        // Every workgroup eventually runs its critical section.
        let work = iters.load(0)?;
        let table = pattern.read()?;
        let threads = (self.launch.global_threads() as usize).min(table.len());
        {
            let mut slots = result.lock();
            for &slot in &table[..threads] {
                if let Some(value) = slots.get_mut(slot as usize) {
                    *value = value.wrapping_add(work);
                }
            }
        }

        trace!(resident, counted = counted.len(), dispatched, "ticket lock");

        let timing = self.config.timing;
        let nanos = timing.launch_overhead_ns as f64
            + dispatched as f64 * work as f64 * timing.ns_per_op;
        Ok(nanos.round() as u64)
    }
}

impl KernelProgram for SimProgram {
    fn run(&mut self) -> Result<()> {
        self.dispatch().map(|_| ())
    }

    fn run_timed(&mut self) -> Result<DispatchTime> {
        self.dispatch().map(DispatchTime::from_nanos)
    }
}
