//! CLI command implementations.

pub mod bench;
pub mod devices;
pub mod interactive;

use std::path::PathBuf;

use clap::ValueEnum;

use atomprobe_core::config::BenchConfig;
use atomprobe_core::error::ProbeError;
use atomprobe_core::kernel::{KernelSet, CONTENTION_KERNEL_FILE};
use atomprobe_core::sweep::SweepPlan;
use atomprobe_sim::{SimConfig, SimDevice};

use crate::error::{CliError, CliResult};

/// Device layer to measure on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// GPU through wgpu (Vulkan, Metal, DX12).
    Wgpu,
    /// In-process simulated device.
    Sim,
}

/// What to measure on each device.
#[derive(Debug, Clone)]
pub enum Mode {
    /// One contention/padding point.
    Single,
    /// Power-of-two contention/padding grid; `None` derives the limit from the
    /// resolved thread count.
    Sweep(Option<SweepPlan>),
}

/// Backend choice plus everything needed to open devices and load kernels.
#[derive(Debug, Clone)]
pub struct Session {
    /// Device layer.
    pub backend: Backend,
    /// Directory holding the kernel artifacts.
    pub kernel_dir: PathBuf,
    /// Resident workgroups of the simulated device.
    pub sim_resident: u32,
    /// Suppress progress output.
    pub quiet: bool,
}

impl Session {
    /// Names of the devices the backend can open, in index order.
    pub fn device_names(&self) -> CliResult<Vec<String>> {
        match self.backend {
            Backend::Sim => Ok(vec![self.sim_config().name]),
            Backend::Wgpu => {
                #[cfg(feature = "wgpu")]
                {
                    Ok(atomprobe_wgpu::enumerate_adapters()
                        .into_iter()
                        .map(|a| format!("{} ({:?})", a.name, a.backend))
                        .collect())
                }
                #[cfg(not(feature = "wgpu"))]
                {
                    Err(wgpu_disabled())
                }
            }
        }
    }

    /// Open device `index` and measure `config` on it.
    pub async fn run(&self, index: usize, config: &BenchConfig, mode: &Mode) -> CliResult<()> {
        match self.backend {
            Backend::Sim => {
                if index != 0 {
                    return Err(ProbeError::DeviceNotFound {
                        index,
                        available: 1,
                    }
                    .into());
                }
                let device = SimDevice::with_config(self.sim_config());
                let kernels = self.sim_kernels(config)?;
                bench::execute(&device, kernels, config, mode, self.quiet)
            }
            Backend::Wgpu => {
                #[cfg(feature = "wgpu")]
                {
                    let device = atomprobe_wgpu::WgpuDevice::open(index).await?;
                    let kernels = self.load_kernels(config)?;
                    bench::execute(&device, kernels, config, mode, self.quiet)
                }
                #[cfg(not(feature = "wgpu"))]
                {
                    Err(wgpu_disabled())
                }
            }
        }
    }

    fn sim_config(&self) -> SimConfig {
        SimConfig::new().with_resident_workgroups(self.sim_resident)
    }

    /// Load what `config` needs: the occupancy kernel only when discovering.
    fn load_kernels(&self, config: &BenchConfig) -> CliResult<KernelSet> {
        let kernels = if config.workgroups.is_none() {
            KernelSet::load_dir(&self.kernel_dir)?
        } else {
            KernelSet::load_contention_only(&self.kernel_dir)?
        };
        Ok(kernels)
    }

    /// Artifacts from disk when present, built-in stubs otherwise.
    fn sim_kernels(&self, config: &BenchConfig) -> CliResult<KernelSet> {
        if self.kernel_dir.join(CONTENTION_KERNEL_FILE).exists() {
            self.load_kernels(config)
        } else {
            tracing::debug!(
                "no kernels in {}, using built-in stubs",
                self.kernel_dir.display()
            );
            Ok(atomprobe_sim::builtin_kernels()?)
        }
    }
}

#[cfg(not(feature = "wgpu"))]
fn wgpu_disabled() -> CliError {
    CliError::FeatureNotAvailable("wgpu backend".to_string(), "wgpu".to_string())
}

/// Parse a positive integer, rejecting zero and non-numeric input.
pub fn parse_positive(text: &str) -> Result<u32, String> {
    match text.trim().parse::<u32>() {
        Ok(0) => Err("value must be positive".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a positive integer", text.trim())),
    }
}

/// Build the configuration the flags describe, on top of an optional file.
pub fn merge_config(
    base: Option<BenchConfig>,
    overrides: &ConfigOverrides,
) -> CliResult<BenchConfig> {
    let mut config = base.unwrap_or_default();
    if let Some(c) = overrides.contention {
        config = config.with_contention(c);
    }
    if let Some(p) = overrides.padding {
        config = config.with_padding(p);
    }
    if let Some(i) = overrides.rmw_iters {
        config = config.with_rmw_iters(i);
    }
    if let Some(t) = overrides.trials {
        config = config.with_trials(t);
    }
    if let Some(s) = overrides.workgroup_size {
        config = config.with_workgroup_size(s);
    }
    if overrides.adaptive {
        let threshold = config.calibration.min_trial_duration_us;
        config = config.with_adaptive(threshold);
    }

    if overrides.discover {
        if overrides.workgroups.is_some() {
            return Err(CliError::Usage(
                "-w and --discover are mutually exclusive".to_string(),
            ));
        }
        config = config.with_discovered_workgroups();
    } else if let Some(w) = overrides.workgroups {
        config = config.with_workgroups(w);
    } else if config.workgroups.is_none() && !overrides.interactive {
        return Err(CliError::Usage(
            "-w <workgroups> is required (or pass --discover)".to_string(),
        ));
    }

    config.validate()?;
    Ok(config)
}

/// Flag values that override the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `-c`
    pub contention: Option<u32>,
    /// `-p`
    pub padding: Option<u32>,
    /// `-w`
    pub workgroups: Option<u32>,
    /// `--workgroup-size`
    pub workgroup_size: Option<u32>,
    /// `-i`
    pub rmw_iters: Option<u32>,
    /// `-t`
    pub trials: Option<u32>,
    /// `--discover`
    pub discover: bool,
    /// `--adaptive`
    pub adaptive: bool,
    /// `--interactive`
    pub interactive: bool,
}
