//! atomprobe - GPU atomic read-modify-write contention benchmark.
//!
//! Measures relaxed atomic fetch-add throughput when `contention` threads
//! share each target and targets sit `padding` words apart, and discovers how
//! many workgroups a device truly keeps resident.
//!
//! # Examples
//!
//! ```bash
//! # 4 threads per target, targets 2 words apart, 64 workgroups
//! atomprobe -c 4 -p 2 -w 64
//!
//! # Derive the workgroup count from occupancy discovery, calibrate trial length
//! atomprobe --discover --adaptive
//!
//! # Throughput grid over power-of-two contention/padding on the simulated device
//! atomprobe --backend sim --discover --sweep
//!
//! # Pick devices and parameters at a prompt
//! atomprobe --interactive
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

use atomprobe_core::config::BenchConfig;
use atomprobe_core::sweep::SweepPlan;

use commands::{devices, interactive, Backend, ConfigOverrides, Mode, Session};
use error::CliResult;

/// GPU atomic RMW contention benchmark and occupancy probe
#[derive(Parser)]
#[command(name = "atomprobe")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Threads sharing one atomic target
    #[arg(short = 'c', long, value_parser = commands::parse_positive)]
    contention: Option<u32>,

    /// Stride in words between distinct targets
    #[arg(short = 'p', long, value_parser = commands::parse_positive)]
    padding: Option<u32>,

    /// Workgroups to dispatch
    #[arg(short = 'w', long, value_parser = commands::parse_positive)]
    workgroups: Option<u32>,

    /// Invocations per workgroup (default: device maximum)
    #[arg(long, value_parser = commands::parse_positive)]
    workgroup_size: Option<u32>,

    /// Device index
    #[arg(short = 'd', long, default_value_t = 0)]
    device: usize,

    /// RMW iterations per thread
    #[arg(short = 'i', long = "iterations", value_parser = commands::parse_positive)]
    rmw_iters: Option<u32>,

    /// Timed trials per measurement
    #[arg(short = 't', long, value_parser = commands::parse_positive)]
    trials: Option<u32>,

    /// Prompt for devices, contention and padding
    #[arg(long)]
    interactive: bool,

    /// Derive the workgroup count from occupancy discovery
    #[arg(long)]
    discover: bool,

    /// Double iterations until trials reach the calibration threshold
    #[arg(long)]
    adaptive: bool,

    /// Measure a power-of-two contention/padding grid
    #[arg(long)]
    sweep: bool,

    /// Largest contention/padding value of the sweep (default: min(threads, 1024))
    #[arg(long, requires = "sweep", value_parser = commands::parse_positive)]
    sweep_limit: Option<u32>,

    /// Device layer
    #[arg(long, value_enum, default_value_t = Backend::Wgpu)]
    backend: Backend,

    /// Directory holding the kernel artifacts
    #[arg(long, default_value = "kernels")]
    kernel_dir: PathBuf,

    /// TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resident workgroups of the simulated device
    #[arg(long, default_value_t = 32, value_parser = commands::parse_positive)]
    sim_resident: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices the backend can open
    Devices {
        /// Device layer
        #[arg(long, value_enum, default_value_t = Backend::Wgpu)]
        backend: Backend,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

impl Cli {
    fn session(&self, backend: Backend) -> Session {
        Session {
            backend,
            kernel_dir: self.kernel_dir.clone(),
            sim_resident: self.sim_resident,
            quiet: self.quiet,
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            contention: self.contention,
            padding: self.padding,
            workgroups: self.workgroups,
            workgroup_size: self.workgroup_size,
            rmw_iters: self.rmw_iters,
            trials: self.trials,
            discover: self.discover,
            adaptive: self.adaptive,
            interactive: self.interactive,
        }
    }

    fn mode(&self) -> Mode {
        if self.sweep {
            Mode::Sweep(self.sweep_limit.map(SweepPlan::powers_of_two))
        } else {
            Mode::Single
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Some(Commands::Devices { backend }) = cli.command {
        return devices::execute(&cli.session(backend));
    }

    let file = cli
        .config
        .as_ref()
        .map(BenchConfig::from_toml_file)
        .transpose()?;
    let config = commands::merge_config(file, &cli.overrides())?;
    let session = cli.session(cli.backend);
    let mode = cli.mode();

    if cli.interactive {
        interactive::execute(&session, config, &mode).await
    } else {
        session.run(cli.device, &config, &mode).await
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if std::env::args_os().len() <= 1 {
        let mut command = Cli::command();
        let _ = command.print_help();
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_short_flags() {
        let cli = Cli::try_parse_from(["atomprobe", "-c", "4", "-p", "2", "-w", "64", "-i", "256"])
            .unwrap();
        assert_eq!(cli.contention, Some(4));
        assert_eq!(cli.padding, Some(2));
        assert_eq!(cli.workgroups, Some(64));
        assert_eq!(cli.rmw_iters, Some(256));
        assert_eq!(cli.device, 0);
        assert_eq!(cli.backend, Backend::Wgpu);
    }

    #[test]
    fn test_rejects_zero_and_text() {
        assert!(Cli::try_parse_from(["atomprobe", "-c", "0", "-w", "4"]).is_err());
        assert!(Cli::try_parse_from(["atomprobe", "-p", "wide", "-w", "4"]).is_err());
    }

    #[test]
    fn test_sweep_limit_requires_sweep() {
        assert!(Cli::try_parse_from(["atomprobe", "-w", "4", "--sweep-limit", "8"]).is_err());
        let cli = Cli::try_parse_from([
            "atomprobe",
            "--backend",
            "sim",
            "-w",
            "4",
            "--sweep",
            "--sweep-limit",
            "8",
        ])
        .unwrap();
        assert!(matches!(cli.mode(), Mode::Sweep(Some(plan)) if plan.contentions.len() == 4));
    }

    #[test]
    fn test_devices_subcommand() {
        let cli = Cli::try_parse_from(["atomprobe", "devices", "--backend", "sim"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Devices {
                backend: Backend::Sim
            })
        ));
    }

    #[tokio::test]
    async fn test_sim_run_end_to_end() {
        let cli = Cli::try_parse_from([
            "atomprobe",
            "--backend",
            "sim",
            "--kernel-dir",
            "/nonexistent",
            "-c",
            "4",
            "-p",
            "2",
            "-w",
            "4",
            "--workgroup-size",
            "64",
            "-t",
            "3",
        ])
        .unwrap();
        run(cli).await.unwrap();
    }

    #[tokio::test]
    async fn test_sim_bad_device_index() {
        let cli = Cli::try_parse_from([
            "atomprobe",
            "--backend",
            "sim",
            "--kernel-dir",
            "/nonexistent",
            "-w",
            "4",
            "-d",
            "3",
        ])
        .unwrap();
        assert!(run(cli).await.is_err());
    }
}
