//! Human-readable results.

use std::fmt;

use crate::occupancy::OccupancyReport;
use crate::validate::ValidationReport;

/// One calibration attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStep {
    /// Iterations per thread in this attempt.
    pub rmw_iters: u32,
    /// Mean trial duration reached.
    pub mean_duration_us: f64,
}

/// Outcome of one contention measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    /// Device name.
    pub device: String,
    /// Invocations per workgroup.
    pub workgroup_size: u32,
    /// Workgroups dispatched.
    pub workgroups: u32,
    /// Discovery report, when the workgroup count was discovered.
    pub occupancy: Option<OccupancyReport>,
    /// Threads per target.
    pub contention: u32,
    /// Target stride.
    pub padding: u32,
    /// Iterations per thread of the reported attempt.
    pub rmw_iters: u32,
    /// Timed trials averaged.
    pub trials: u32,
    /// Result buffer length in words.
    pub result_len: usize,
    /// Mean throughput, atomic operations per microsecond.
    pub throughput_ops_per_us: f64,
    /// Mean dispatch duration in microseconds.
    pub mean_duration_us: f64,
    /// Every calibration attempt, the reported one last.
    pub calibration: Vec<CalibrationStep>,
    /// Correctness verdict.
    pub validation: ValidationReport,
}

impl BenchmarkReport {
    /// Global invocations.
    pub fn global_threads(&self) -> u64 {
        self.workgroup_size as u64 * self.workgroups as u64
    }

    /// Mismatching result slots.
    pub fn error_count(&self) -> usize {
        self.validation.error_count()
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Device: {}, workgroups ({}, 1) x {}",
            self.device, self.workgroup_size, self.workgroups
        )?;
        if let Some(occupancy) = &self.occupancy {
            writeln!(
                f,
                "Occupancy: {} of {} probe workgroups (trials: {:?})",
                occupancy.occupancy, occupancy.probe_workgroups, occupancy.observations
            )?;
        }
        writeln!(
            f,
            "Contention: {}, Padding: {}, RMW iterations: {}",
            self.contention, self.padding, self.rmw_iters
        )?;
        writeln!(
            f,
            "Throughput: {:.3} atomic operations per microsecond",
            self.throughput_ops_per_us
        )?;
        writeln!(f, "Mean trial duration: {:.3} us", self.mean_duration_us)?;
        write!(f, "Kernel error count: {}", self.error_count())?;
        if self.validation.stray > 0 {
            write!(f, " ({} stray writes)", self.validation.stray)?;
        }
        Ok(())
    }
}

/// One cell of a contention/padding sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepCell {
    /// Threads per target.
    pub contention: u32,
    /// Target stride.
    pub padding: u32,
    /// Mean throughput, ops/us.
    pub throughput_ops_per_us: f64,
    /// Mismatching slots.
    pub errors: usize,
}

/// Throughput grid over contention (columns) and padding (rows).
#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    /// Device name.
    pub device: String,
    /// Invocations per workgroup.
    pub workgroup_size: u32,
    /// Workgroups dispatched.
    pub workgroups: u32,
    /// Column values.
    pub contentions: Vec<u32>,
    /// Row values.
    pub paddings: Vec<u32>,
    /// Cells in row-major order (padding outer, contention inner).
    pub cells: Vec<SweepCell>,
}

impl SweepGrid {
    /// Cell at `(contention, padding)`.
    pub fn get(&self, contention: u32, padding: u32) -> Option<&SweepCell> {
        self.cells
            .iter()
            .find(|c| c.contention == contention && c.padding == padding)
    }

    /// Total mismatching slots over all cells.
    pub fn total_errors(&self) -> usize {
        self.cells.iter().map(|c| c.errors).sum()
    }
}

impl fmt::Display for SweepGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Device: {}, workgroups ({}, 1) x {}",
            self.device, self.workgroup_size, self.workgroups
        )?;
        write!(f, "{:>9} |", "pad\\cont")?;
        for c in &self.contentions {
            write!(f, "{:>10}", c)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", "-".repeat(11 + 10 * self.contentions.len()))?;
        for &p in &self.paddings {
            write!(f, "{:>9} |", p)?;
            for &c in &self.contentions {
                match self.get(c, p) {
                    Some(cell) if cell.errors > 0 => {
                        write!(f, "{:>9.2}!", cell.throughput_ops_per_us)?
                    }
                    Some(cell) => write!(f, "{:>10.2}", cell.throughput_ops_per_us)?,
                    None => write!(f, "{:>10}", "-")?,
                }
            }
            writeln!(f)?;
        }
        write!(f, "(ops/us; '!' marks cells with validation errors)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> BenchmarkReport {
        BenchmarkReport {
            device: "Simulated GPU".to_string(),
            workgroup_size: 64,
            workgroups: 4,
            occupancy: None,
            contention: 1,
            padding: 1,
            rmw_iters: 128,
            trials: 3,
            result_len: 256,
            throughput_ops_per_us: 1234.5,
            mean_duration_us: 26.5,
            calibration: vec![],
            validation: ValidationReport {
                checked: 256,
                mismatches: 0,
                stray: 0,
            },
        }
    }

    #[test]
    fn test_report_lines() {
        let text = report().to_string();
        assert!(text.contains("Device: Simulated GPU, workgroups (64, 1) x 4"));
        assert!(text.contains("Throughput: 1234.500 atomic operations per microsecond"));
        assert!(text.contains("Mean trial duration: 26.500 us"));
        assert!(text.ends_with("Kernel error count: 0"));
    }

    #[test]
    fn test_report_mentions_occupancy() {
        let mut r = report();
        r.occupancy = Some(OccupancyReport {
            workgroup_size: 64,
            probe_workgroups: 256,
            observations: vec![3, 4, 4],
            occupancy: 4,
        });
        assert!(r.to_string().contains("Occupancy: 4 of 256"));
        assert_eq!(r.global_threads(), 256);
    }

    #[test]
    fn test_sweep_table() {
        let grid = SweepGrid {
            device: "dev".to_string(),
            workgroup_size: 2,
            workgroups: 1,
            contentions: vec![1, 2],
            paddings: vec![1, 2],
            cells: vec![
                SweepCell {
                    contention: 1,
                    padding: 1,
                    throughput_ops_per_us: 10.0,
                    errors: 0,
                },
                SweepCell {
                    contention: 2,
                    padding: 1,
                    throughput_ops_per_us: 5.0,
                    errors: 1,
                },
            ],
        };
        let text = grid.to_string();
        assert!(text.contains("10.00"));
        assert!(text.contains("5.00!"));
        assert_eq!(grid.total_errors(), 1);
        assert!(grid.get(2, 2).is_none());
    }
}
