//! Single-point and sweep measurements.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use atomprobe_core::bench::ContentionBenchmark;
use atomprobe_core::config::BenchConfig;
use atomprobe_core::device::ComputeDevice;
use atomprobe_core::kernel::KernelSet;
use atomprobe_core::report::BenchmarkReport;
use atomprobe_core::sweep::SweepPlan;

use crate::error::CliResult;

use super::Mode;

/// Measure `config` on `device` and print the result.
pub fn execute<D: ComputeDevice>(
    device: &D,
    kernels: KernelSet,
    config: &BenchConfig,
    mode: &Mode,
    quiet: bool,
) -> CliResult<()> {
    let info = device.info();
    println!("{} Benchmarking {}", "→".bright_cyan(), info.name.bright_white());
    println!("  {} Backend: {}", "•".dimmed(), info.backend.bright_yellow());
    println!(
        "  {} Timing: {}",
        "•".dimmed(),
        if info.timestamp_queries {
            "device timestamps".bright_yellow()
        } else {
            "host clock".yellow()
        }
    );
    println!();

    let engine = ContentionBenchmark::new(device, kernels);
    match mode {
        Mode::Single => {
            let report = engine.run(config)?;
            print_report(&report);
        }
        Mode::Sweep(plan) => sweep(&engine, config, plan.clone(), quiet)?,
    }
    Ok(())
}

fn print_report(report: &BenchmarkReport) {
    println!("{}", report);
    if report.calibration.len() > 1 {
        println!(
            "  {} Calibrated over {} attempts to {} iterations",
            "•".dimmed(),
            report.calibration.len(),
            report.rmw_iters
        );
    }
    if report.error_count() == 0 {
        println!("{} Result buffer validated", "✓".bright_green());
    } else {
        println!(
            "{} {} result slots mismatched",
            "✗".bright_red(),
            report.error_count().to_string().bright_red()
        );
    }
}

fn sweep<D: ComputeDevice>(
    engine: &ContentionBenchmark<'_, D>,
    config: &BenchConfig,
    plan: Option<SweepPlan>,
    quiet: bool,
) -> CliResult<()> {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  "),
    );

    let grid = engine.sweep(config, plan, |cell, total| {
        pb.set_length(total as u64);
        pb.inc(1);
        pb.set_message(format!(
            "c={} p={}: {:.1} ops/us",
            cell.contention, cell.padding, cell.throughput_ops_per_us
        ));
    });
    pb.finish_and_clear();
    let grid = grid?;

    println!("{}", grid);
    if grid.total_errors() > 0 {
        println!(
            "{} {} mismatched slots across the sweep",
            "✗".bright_red(),
            grid.total_errors().to_string().bright_red()
        );
    }
    Ok(())
}
