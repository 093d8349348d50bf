//! Benchmark configuration.
//!
//! Defaults follow the reference measurement setup: 8 timed trials, 128 RMW
//! iterations per thread, and (when adaptive) a 1 s mean-trial threshold.
//! Configurations can be built in code with the `with_*` setters or loaded
//! from TOML:
//!
//! ```toml
//! contention = 4
//! padding = 2
//! trials = 8
//!
//! [calibration]
//! adaptive = true
//! min_trial_duration_us = 1000000.0
//! max_doublings = 16
//!
//! [occupancy]
//! trials = 3
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{ProbeError, Result};
use crate::occupancy::OccupancyParams;

/// Adaptive calibration settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Double the iteration count until trials run long enough.
    pub adaptive: bool,
    /// Mean trial duration an attempt must reach, in microseconds.
    pub min_trial_duration_us: f64,
    /// Doublings allowed before giving up.
    pub max_doublings: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            adaptive: false,
            min_trial_duration_us: 1_000_000.0,
            max_doublings: 16,
        }
    }
}

/// Parameters of one contention measurement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Threads sharing one RMW target.
    pub contention: u32,
    /// Slot stride between targets.
    pub padding: u32,
    /// Workgroups to dispatch; `None` runs occupancy discovery.
    pub workgroups: Option<u32>,
    /// Invocations per workgroup; `None` uses the device maximum.
    pub workgroup_size: Option<u32>,
    /// Timed dispatches per attempt.
    pub trials: u32,
    /// RMW operations per thread (initial value when adaptive).
    pub rmw_iters: u32,
    /// Calibration loop settings.
    pub calibration: CalibrationConfig,
    /// Occupancy discovery settings.
    pub occupancy: OccupancyParams,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            contention: 1,
            padding: 1,
            workgroups: None,
            workgroup_size: None,
            trials: 8,
            rmw_iters: 128,
            calibration: CalibrationConfig::default(),
            occupancy: OccupancyParams::default(),
        }
    }
}

impl BenchConfig {
    /// Configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ProbeError::InvalidConfig(e.to_string()))
    }

    /// Load a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Set contention.
    pub fn with_contention(mut self, contention: u32) -> Self {
        self.contention = contention;
        self
    }

    /// Set padding.
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Dispatch a fixed number of workgroups.
    pub fn with_workgroups(mut self, workgroups: u32) -> Self {
        self.workgroups = Some(workgroups);
        self
    }

    /// Derive the workgroup count from occupancy discovery.
    pub fn with_discovered_workgroups(mut self) -> Self {
        self.workgroups = None;
        self
    }

    /// Override the workgroup size.
    pub fn with_workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = Some(size);
        self
    }

    /// Set timed trials per attempt.
    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    /// Set RMW iterations per thread.
    pub fn with_rmw_iters(mut self, rmw_iters: u32) -> Self {
        self.rmw_iters = rmw_iters;
        self
    }

    /// Enable adaptive calibration with `min_trial_duration_us` threshold.
    pub fn with_adaptive(mut self, min_trial_duration_us: f64) -> Self {
        self.calibration.adaptive = true;
        self.calibration.min_trial_duration_us = min_trial_duration_us;
        self
    }

    /// Bound the calibration loop.
    pub fn with_max_doublings(mut self, max_doublings: u32) -> Self {
        self.calibration.max_doublings = max_doublings;
        self
    }

    /// Set occupancy discovery parameters.
    pub fn with_occupancy(mut self, occupancy: OccupancyParams) -> Self {
        self.occupancy = occupancy;
        self
    }

    /// Check everything that can be checked without a device.
    pub fn validate(&self) -> Result<()> {
        if self.contention == 0 {
            return Err(ProbeError::InvalidConfig(
                "contention must be at least 1".to_string(),
            ));
        }
        if self.padding == 0 {
            return Err(ProbeError::InvalidConfig(
                "padding must be at least 1".to_string(),
            ));
        }
        if self.trials == 0 {
            return Err(ProbeError::InvalidConfig(
                "at least one timed trial is required".to_string(),
            ));
        }
        if self.rmw_iters == 0 {
            return Err(ProbeError::InvalidConfig(
                "rmw iterations must be at least 1".to_string(),
            ));
        }
        if self.workgroups == Some(0) {
            return Err(ProbeError::InvalidConfig(
                "workgroup count must be at least 1".to_string(),
            ));
        }
        if self.workgroup_size == Some(0) {
            return Err(ProbeError::InvalidConfig(
                "workgroup size must be at least 1".to_string(),
            ));
        }
        if self.rmw_iters.checked_mul(self.contention).is_none() {
            return Err(ProbeError::InvalidConfig(format!(
                "{} iterations x contention {} overflows a 32-bit counter",
                self.rmw_iters, self.contention
            )));
        }
        if self.calibration.adaptive {
            let min = self.calibration.min_trial_duration_us;
            if !min.is_finite() || min <= 0.0 {
                return Err(ProbeError::InvalidConfig(format!(
                    "calibration threshold {} us must be positive",
                    min
                )));
            }
        }
        if self.workgroups.is_none() {
            self.occupancy.validate()?;
        }
        Ok(())
    }
}
