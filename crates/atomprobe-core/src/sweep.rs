//! Contention/padding sweeps.
//!
//! Runs the benchmark over a power-of-two grid of contention and padding
//! values on one fixed workgroup grid, resolving occupancy once up front.
//!
//! Every cell's configuration is checked before the first measurement. A
//! device failure in any cell aborts the sweep; cells already measured are
//! reported through the callback but no partial grid is returned.

use tracing::info;

use crate::bench::ContentionBenchmark;
use crate::config::BenchConfig;
use crate::device::ComputeDevice;
use crate::error::{ProbeError, Result};
use crate::report::{SweepCell, SweepGrid};

/// Largest contention/padding value a default sweep visits.
pub const DEFAULT_SWEEP_LIMIT: u32 = 1024;

/// Values visited by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    /// Contention values.
    pub contentions: Vec<u32>,
    /// Padding values.
    pub paddings: Vec<u32>,
}

impl SweepPlan {
    /// `1, 2, 4, ...` up to and including `limit` on both axes.
    pub fn powers_of_two(limit: u32) -> Self {
        let values: Vec<u32> = std::iter::successors(Some(1u32), |v| v.checked_mul(2))
            .take_while(|&v| v <= limit.max(1))
            .collect();
        Self {
            contentions: values.clone(),
            paddings: values,
        }
    }

    /// Default plan for `global_threads` invocations: powers of two up to
    /// `min(global_threads, 1024)`.
    pub fn for_threads(global_threads: u64) -> Self {
        Self::powers_of_two(global_threads.min(DEFAULT_SWEEP_LIMIT as u64) as u32)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.contentions.len() * self.paddings.len()
    }

    /// True when either axis is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every cell of the plan as a variation of `base`.
    pub fn check(&self, base: &BenchConfig) -> Result<()> {
        if self.is_empty() {
            return Err(ProbeError::InvalidConfig("sweep plan is empty".to_string()));
        }
        for &padding in &self.paddings {
            for &contention in &self.contentions {
                base.clone()
                    .with_contention(contention)
                    .with_padding(padding)
                    .validate()?;
            }
        }
        Ok(())
    }
}

impl<'a, D: ComputeDevice> ContentionBenchmark<'a, D> {
    /// Measure every cell of `plan` (or the default plan for the resolved grid).
    ///
    /// `on_cell` is called after each measurement with the cell and the total
    /// cell count, e.g. to drive a progress bar.
    pub fn sweep<F>(
        &self,
        base: &BenchConfig,
        plan: Option<SweepPlan>,
        mut on_cell: F,
    ) -> Result<SweepGrid>
    where
        F: FnMut(&SweepCell, usize),
    {
        // An explicit plan is checked before discovery touches the device.
        if let Some(plan) = &plan {
            plan.check(base)?;
        }
        let grid = self.resolve_grid(base)?;
        let launch = grid.launch;
        let plan = match plan {
            Some(plan) => plan,
            None => {
                let plan = SweepPlan::for_threads(launch.global_threads());
                plan.check(base)?;
                plan
            }
        };

        let total = plan.len();
        info!(
            cells = total,
            workgroup_size = launch.workgroup_size,
            workgroups = launch.workgroups,
            "starting sweep"
        );

        let mut cells = Vec::with_capacity(total);
        for &padding in &plan.paddings {
            for &contention in &plan.contentions {
                let config = base
                    .clone()
                    .with_contention(contention)
                    .with_padding(padding)
                    .with_workgroups(launch.workgroups)
                    .with_workgroup_size(launch.workgroup_size);
                let report = self.run_on_grid(&config, grid.clone())?;
                let cell = SweepCell {
                    contention,
                    padding,
                    throughput_ops_per_us: report.throughput_ops_per_us,
                    errors: report.error_count(),
                };
                on_cell(&cell, total);
                cells.push(cell);
            }
        }

        Ok(SweepGrid {
            device: self.device().info().name.clone(),
            workgroup_size: launch.workgroup_size,
            workgroups: launch.workgroups,
            contentions: plan.contentions,
            paddings: plan.paddings,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powers_of_two() {
        let plan = SweepPlan::powers_of_two(16);
        assert_eq!(plan.contentions, vec![1, 2, 4, 8, 16]);
        assert_eq!(plan.paddings, plan.contentions);
        assert_eq!(plan.len(), 25);
    }

    #[test]
    fn test_limit_not_power_of_two() {
        assert_eq!(SweepPlan::powers_of_two(100).contentions.last(), Some(&64));
        assert_eq!(SweepPlan::powers_of_two(0).contentions, vec![1]);
    }

    #[test]
    fn test_plan_for_threads_caps_at_1024() {
        let plan = SweepPlan::for_threads(1 << 20);
        assert_eq!(plan.contentions.len(), 11);
        assert_eq!(plan.contentions.last(), Some(&1024));

        let small = SweepPlan::for_threads(256);
        assert_eq!(small.contentions.last(), Some(&256));
    }

    #[test]
    fn test_check_rejects_overflowing_cell() {
        let base = BenchConfig::new().with_rmw_iters(1 << 24);
        let plan = SweepPlan {
            contentions: vec![1, 1 << 8],
            paddings: vec![1],
        };
        assert!(plan.check(&base).is_err());
        assert!(SweepPlan::powers_of_two(128).check(&base).is_ok());
    }

    #[test]
    fn test_check_rejects_empty_plan() {
        let plan = SweepPlan {
            contentions: vec![],
            paddings: vec![1],
        };
        assert!(plan.check(&BenchConfig::new()).is_err());

        let zero = SweepPlan {
            contentions: vec![1],
            paddings: vec![0],
        };
        assert!(zero.check(&BenchConfig::new()).is_err());
    }
}
