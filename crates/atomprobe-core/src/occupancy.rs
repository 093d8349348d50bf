//! Occupancy discovery.
//!
//! Finds how many workgroups the device actually keeps resident at once by
//! dispatching a ticket-lock kernel: each workgroup takes a ticket, waits
//! until `now_serving` reaches it, and, while the poll is still open, bumps a
//! shared occupant counter before passing the lock on. Workgroups that were
//! not yet scheduled when the poll closed are never counted, so each trial
//! yields a lower bound on true occupancy. The host repeats the trial with
//! fresh state and keeps the maximum.

use serde::Deserialize;
use tracing::{debug, info};

use crate::binding::{Bindings, BufferRole, OCCUPANCY_LAYOUT};
use crate::device::{ComputeDevice, DeviceBuffer, KernelProgram, LaunchConfig};
use crate::error::{ProbeError, Result};
use crate::kernel::KernelBinary;
use crate::pattern;

/// Host-side parameters of the discovery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OccupancyParams {
    /// Workgroups dispatched per trial; the upper bound of any estimate.
    pub probe_workgroups: u32,
    /// Independent trials reduced by maximum.
    pub trials: u32,
    /// Iteration count handed to the kernel to size its critical section.
    pub critical_section_iters: u32,
}

impl Default for OccupancyParams {
    fn default() -> Self {
        Self {
            probe_workgroups: 256,
            trials: 3,
            critical_section_iters: 1024,
        }
    }
}

impl OccupancyParams {
    /// Reject parameters that cannot produce an estimate.
    pub fn validate(&self) -> Result<()> {
        if self.probe_workgroups == 0 {
            return Err(ProbeError::InvalidConfig(
                "occupancy probe needs at least one workgroup".to_string(),
            ));
        }
        if self.trials == 0 {
            return Err(ProbeError::InvalidConfig(
                "occupancy discovery needs at least one trial".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyReport {
    /// Workgroup size probed with.
    pub workgroup_size: u32,
    /// Workgroups dispatched per trial.
    pub probe_workgroups: u32,
    /// Occupant count observed by each trial, in order.
    pub observations: Vec<u32>,
    /// Maximum across trials.
    pub occupancy: u32,
}

/// State buffers of one discovery trial, in binding order.
struct TrialBuffers<B> {
    result: B,
    rmw_iters: B,
    strategy: B,
    count: B,
    poll_open: B,
    scratch: B,
    now_serving: B,
    next_ticket: B,
}

impl<B: DeviceBuffer> TrialBuffers<B> {
    fn allocate<D>(device: &D, params: &OccupancyParams, workgroup_size: u32) -> Result<Self>
    where
        D: ComputeDevice<Buffer = B>,
    {
        let threads = workgroup_size * params.probe_workgroups;
        let result = device.allocate(threads as usize, BufferRole::Result.label())?;
        result.clear()?;
        let scratch = device.allocate(
            params.probe_workgroups as usize,
            BufferRole::WorkgroupScratch.label(),
        )?;
        scratch.clear()?;

        Ok(Self {
            result,
            rmw_iters: device.allocate_init(
                &[params.critical_section_iters],
                BufferRole::IterationCount.label(),
            )?,
            strategy: device
                .allocate_init(&pattern::identity(threads), BufferRole::AccessPattern.label())?,
            count: device.allocate_init(&[0], BufferRole::OccupancyCount.label())?,
            // The poll starts open.
            poll_open: device.allocate_init(&[1], BufferRole::PollOpen.label())?,
            scratch,
            now_serving: device.allocate_init(&[0], BufferRole::NowServing.label())?,
            next_ticket: device.allocate_init(&[0], BufferRole::NextTicket.label())?,
        })
    }

    fn bindings(&self) -> Result<Bindings<'_, B>> {
        Bindings::builder(&OCCUPANCY_LAYOUT)
            .bind(BufferRole::Result, &self.result)?
            .bind(BufferRole::IterationCount, &self.rmw_iters)?
            .bind(BufferRole::AccessPattern, &self.strategy)?
            .bind(BufferRole::OccupancyCount, &self.count)?
            .bind(BufferRole::PollOpen, &self.poll_open)?
            .bind(BufferRole::WorkgroupScratch, &self.scratch)?
            .bind(BufferRole::NowServing, &self.now_serving)?
            .bind(BufferRole::NextTicket, &self.next_ticket)?
            .finish()
    }
}

/// Runs the ticket-lock kernel and reduces trials to one estimate.
pub struct OccupancyDiscovery<'a, D: ComputeDevice> {
    device: &'a D,
    kernel: &'a KernelBinary,
    params: OccupancyParams,
}

impl<'a, D: ComputeDevice> OccupancyDiscovery<'a, D> {
    /// Discovery on `device` with the occupancy `kernel`.
    pub fn new(device: &'a D, kernel: &'a KernelBinary, params: OccupancyParams) -> Self {
        Self {
            device,
            kernel,
            params,
        }
    }

    /// Parameters in use.
    pub fn params(&self) -> &OccupancyParams {
        &self.params
    }

    /// Estimate resident workgroups at `workgroup_size` invocations each.
    pub fn discover(&self, workgroup_size: u32) -> Result<OccupancyReport> {
        self.params.validate()?;
        let launch = LaunchConfig {
            workgroup_size,
            workgroups: self.params.probe_workgroups,
        };
        launch.check(self.device.info())?;

        let kernel = self.kernel.with_workgroup_size(workgroup_size);
        let mut observations = Vec::with_capacity(self.params.trials as usize);
        for trial in 0..self.params.trials {
            let count = self.run_trial(&kernel, launch)?;
            debug!(trial, count, "occupancy trial");
            observations.push(count);
        }

        let occupancy = observations.iter().copied().max().unwrap_or(1);
        info!(
            device = %self.device.info().name,
            workgroup_size,
            occupancy,
            trials = self.params.trials,
            "discovered occupancy"
        );

        Ok(OccupancyReport {
            workgroup_size,
            probe_workgroups: self.params.probe_workgroups,
            observations,
            occupancy,
        })
    }

    fn run_trial(&self, kernel: &KernelBinary, launch: LaunchConfig) -> Result<u32> {
        let buffers = TrialBuffers::allocate(self.device, &self.params, launch.workgroup_size)?;
        let bindings = buffers.bindings()?;

        let mut program = self.device.create_program(kernel, &bindings, launch)?;
        program.run()?;
        drop(program);

        let count = buffers.count.load(0)?;
        if count == 0 || count > launch.workgroups {
            return Err(ProbeError::KernelContractViolation(format!(
                "occupancy count {} outside [1, {}]",
                count, launch.workgroups
            )));
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = OccupancyParams::default();
        assert_eq!(params.probe_workgroups, 256);
        assert_eq!(params.trials, 3);
        assert_eq!(params.critical_section_iters, 1024);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_reject_zero() {
        let params = OccupancyParams {
            trials: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = OccupancyParams {
            probe_workgroups: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_params_from_toml() {
        let params: OccupancyParams = toml::from_str("trials = 5").unwrap();
        assert_eq!(params.trials, 5);
        assert_eq!(params.probe_workgroups, 256);
    }
}
