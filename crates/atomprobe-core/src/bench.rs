//! Contention benchmark engine.
//!
//! One measurement goes through four stages:
//!
//! 1. resolve the grid: workgroup size from the device (or config), workgroup
//!    count from config or from [`OccupancyDiscovery`];
//! 2. allocate the result, iteration-count and access-pattern buffers;
//! 3. run `trials` timed dispatches, clearing the result buffer before each,
//!    and average duration and per-trial throughput. With adaptive
//!    calibration, an attempt whose mean duration falls below the threshold
//!    is discarded and the whole attempt repeated at twice the iteration
//!    count;
//! 4. validate the result buffer left by the final trial.

use tracing::{debug, info, warn};

use crate::binding::{Bindings, BufferRole, CONTENTION_LAYOUT};
use crate::config::BenchConfig;
use crate::device::{ComputeDevice, DeviceBuffer, KernelProgram, LaunchConfig};
use crate::error::{ProbeError, Result};
use crate::kernel::{KernelBinary, KernelSet};
use crate::occupancy::{OccupancyDiscovery, OccupancyReport};
use crate::pattern::AccessPattern;
use crate::report::{BenchmarkReport, CalibrationStep};
use crate::validate::ResultValidator;

/// Averages over the timed trials of one attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialStats {
    /// Trials averaged.
    pub trials: u32,
    /// Mean dispatch duration in microseconds.
    pub mean_duration_us: f64,
    /// Mean of per-trial throughput, in operations per microsecond.
    pub mean_rate: f64,
}

/// Accumulates per-trial durations and rates.
#[derive(Debug, Default)]
struct TrialAccumulator {
    trials: u32,
    total_duration_us: f64,
    total_rate: f64,
}

impl TrialAccumulator {
    fn record(&mut self, duration_us: f64, operations: f64) {
        self.trials += 1;
        self.total_duration_us += duration_us;
        self.total_rate += operations / duration_us;
    }

    fn finish(&self) -> TrialStats {
        let n = self.trials.max(1) as f64;
        TrialStats {
            trials: self.trials,
            mean_duration_us: self.total_duration_us / n,
            mean_rate: self.total_rate / n,
        }
    }
}

/// Workgroup grid chosen for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGrid {
    /// Launch shape.
    pub launch: LaunchConfig,
    /// Discovery report when the count was discovered.
    pub occupancy: Option<OccupancyReport>,
}

/// Buffers of one calibration attempt, in binding order.
struct ContentionBuffers<B> {
    result: B,
    rmw_iters: B,
    strategy: B,
}

impl<B: DeviceBuffer> ContentionBuffers<B> {
    fn allocate<D>(device: &D, pattern: &AccessPattern, rmw_iters: u32) -> Result<Self>
    where
        D: ComputeDevice<Buffer = B>,
    {
        let result = device.allocate(pattern.result_len(), BufferRole::Result.label())?;
        result.clear()?;
        let rmw_iters = device.allocate_init(&[rmw_iters], BufferRole::IterationCount.label())?;
        let strategy = device.allocate_init(&pattern.generate(), BufferRole::AccessPattern.label())?;
        Ok(Self {
            result,
            rmw_iters,
            strategy,
        })
    }

    fn bindings(&self) -> Result<Bindings<'_, B>> {
        Bindings::builder(&CONTENTION_LAYOUT)
            .bind(BufferRole::Result, &self.result)?
            .bind(BufferRole::IterationCount, &self.rmw_iters)?
            .bind(BufferRole::AccessPattern, &self.strategy)?
            .finish()
    }
}

/// An attempt's statistics plus the buffers it left behind.
struct Attempt<B> {
    buffers: ContentionBuffers<B>,
    stats: TrialStats,
}

/// Drives contention measurements on one device.
///
/// The engine borrows the device and owns its kernel artifacts; every buffer
/// it allocates is dropped before [`run`](Self::run) returns, on success and on
/// every error path.
pub struct ContentionBenchmark<'a, D: ComputeDevice> {
    device: &'a D,
    kernels: KernelSet,
}

impl<'a, D: ComputeDevice> ContentionBenchmark<'a, D> {
    /// Engine over `device` with preloaded `kernels`.
    pub fn new(device: &'a D, kernels: KernelSet) -> Self {
        Self { device, kernels }
    }

    /// The device measured.
    pub fn device(&self) -> &'a D {
        self.device
    }

    /// Pick workgroup size and count for `config`.
    pub fn resolve_grid(&self, config: &BenchConfig) -> Result<ResolvedGrid> {
        config.validate()?;
        let info = self.device.info();
        let workgroup_size = config
            .workgroup_size
            .unwrap_or(info.max_workgroup_invocations);

        let (workgroups, occupancy) = match config.workgroups {
            Some(count) => (count, None),
            None => {
                let kernel = self.kernels.occupancy.as_ref().ok_or_else(|| {
                    ProbeError::InvalidConfig(
                        "no workgroup count given and no occupancy kernel loaded".to_string(),
                    )
                })?;
                // Check the size before discovery allocates anything.
                LaunchConfig {
                    workgroup_size,
                    workgroups: 1,
                }
                .check(info)?;
                let report = OccupancyDiscovery::new(self.device, kernel, config.occupancy)
                    .discover(workgroup_size)?;
                (report.occupancy, Some(report))
            }
        };

        let launch = LaunchConfig {
            workgroup_size,
            workgroups,
        };
        launch.check(info)?;
        Ok(ResolvedGrid { launch, occupancy })
    }

    /// Measure throughput and correctness for `config`.
    pub fn run(&self, config: &BenchConfig) -> Result<BenchmarkReport> {
        let grid = self.resolve_grid(config)?;
        self.run_on_grid(config, grid)
    }

    /// Measure on an already resolved grid.
    pub fn run_on_grid(&self, config: &BenchConfig, grid: ResolvedGrid) -> Result<BenchmarkReport> {
        config.validate()?;
        let launch = grid.launch;
        let pattern = AccessPattern::new(
            launch.global_threads() as u32,
            config.contention,
            config.padding,
        )?;
        let kernel = self.kernels.contention.with_workgroup_size(launch.workgroup_size);

        info!(
            device = %self.device.info().name,
            workgroup_size = launch.workgroup_size,
            workgroups = launch.workgroups,
            contention = config.contention,
            padding = config.padding,
            "starting contention benchmark"
        );

        let (attempt, rmw_iters, calibration) = self.calibrate(config, &kernel, &pattern, launch)?;

        let result = attempt.buffers.result.read()?;
        let validation = ResultValidator::new(pattern, rmw_iters).validate(&result);
        if validation.error_count() > 0 {
            warn!(
                errors = validation.error_count(),
                "result buffer does not match expected counts"
            );
        }

        Ok(BenchmarkReport {
            device: self.device.info().name.clone(),
            workgroup_size: launch.workgroup_size,
            workgroups: launch.workgroups,
            occupancy: grid.occupancy,
            contention: config.contention,
            padding: config.padding,
            rmw_iters,
            trials: attempt.stats.trials,
            result_len: pattern.result_len(),
            throughput_ops_per_us: attempt.stats.mean_rate,
            mean_duration_us: attempt.stats.mean_duration_us,
            calibration,
            validation,
        })
    }

    /// Run attempts until one is long enough (or once, when not adaptive).
    fn calibrate(
        &self,
        config: &BenchConfig,
        kernel: &KernelBinary,
        pattern: &AccessPattern,
        launch: LaunchConfig,
    ) -> Result<(Attempt<D::Buffer>, u32, Vec<CalibrationStep>)> {
        let calibration = config.calibration;
        let mut rmw_iters = config.rmw_iters;
        let mut steps = Vec::new();
        let mut doublings = 0;

        loop {
            let attempt = self.attempt(kernel, pattern, launch, rmw_iters, config.trials)?;
            let mean_us = attempt.stats.mean_duration_us;
            steps.push(CalibrationStep {
                rmw_iters,
                mean_duration_us: mean_us,
            });

            if !calibration.adaptive || mean_us >= calibration.min_trial_duration_us {
                return Ok((attempt, rmw_iters, steps));
            }

            let attempts = steps.len() as u32;
            let exhausted = move || ProbeError::CalibrationExhausted {
                attempts,
                rmw_iters,
                last_mean_us: mean_us,
            };
            if doublings >= calibration.max_doublings {
                return Err(exhausted());
            }
            rmw_iters = rmw_iters
                .checked_mul(2)
                .filter(|n| n.checked_mul(pattern.contention()).is_some())
                .ok_or_else(exhausted)?;
            doublings += 1;

            debug!(
                mean_us,
                threshold_us = calibration.min_trial_duration_us,
                next_iters = rmw_iters,
                "attempt too short, doubling iterations"
            );
        }
    }

    /// One attempt: fresh buffers, `trials` timed dispatches.
    fn attempt(
        &self,
        kernel: &KernelBinary,
        pattern: &AccessPattern,
        launch: LaunchConfig,
        rmw_iters: u32,
        trials: u32,
    ) -> Result<Attempt<D::Buffer>> {
        let buffers = ContentionBuffers::allocate(self.device, pattern, rmw_iters)?;
        let mut program = {
            let bindings = buffers.bindings()?;
            self.device.create_program(kernel, &bindings, launch)?
        };

        let operations = rmw_iters as f64 * launch.global_threads() as f64;
        let mut acc = TrialAccumulator::default();
        for trial in 0..trials {
            buffers.result.clear()?;
            let time = program.run_timed()?;
            if time.as_nanos() == 0 {
                return Err(ProbeError::TimingUnavailable(format!(
                    "trial {} reported a zero duration",
                    trial
                )));
            }
            acc.record(time.as_micros_f64(), operations);
        }
        drop(program);

        let stats = acc.finish();
        debug!(
            rmw_iters,
            mean_us = stats.mean_duration_us,
            rate = stats.mean_rate,
            "attempt finished"
        );
        Ok(Attempt { buffers, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_means() {
        let mut acc = TrialAccumulator::default();
        acc.record(10.0, 1000.0);
        acc.record(20.0, 1000.0);
        let stats = acc.finish();

        assert_eq!(stats.trials, 2);
        assert!((stats.mean_duration_us - 15.0).abs() < 1e-9);
        // Mean of per-trial rates (100 and 50), not total ops / total time.
        assert!((stats.mean_rate - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_accumulator_empty() {
        let stats = TrialAccumulator::default().finish();
        assert_eq!(stats.trials, 0);
        assert_eq!(stats.mean_rate, 0.0);
    }
}
