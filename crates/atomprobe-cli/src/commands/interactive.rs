//! Interactive device selection and parameter prompts.

use std::io::{BufRead, Write};

use colored::Colorize;

use atomprobe_core::config::BenchConfig;
use atomprobe_core::error::ProbeError;

use crate::error::{CliError, CliResult};

use super::{parse_positive, Mode, Session};

/// Prompt for devices and parameters, then benchmark every selected device
/// with discovered occupancy and adaptive calibration.
pub async fn execute(session: &Session, base: BenchConfig, mode: &Mode) -> CliResult<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    execute_with(session, base, mode, &mut input, &mut output).await
}

/// [`execute`] over arbitrary prompt streams.
pub async fn execute_with<R: BufRead, W: Write>(
    session: &Session,
    base: BenchConfig,
    mode: &Mode,
    input: &mut R,
    output: &mut W,
) -> CliResult<()> {
    let names = session.device_names()?;
    if names.is_empty() {
        return Err(ProbeError::BackendUnavailable("no devices found".to_string()).into());
    }

    let selected = select_devices(input, output, &names)?;
    let contention = prompt_positive(input, output, "Contention")?;
    let padding = prompt_positive(input, output, "Padding")?;

    let threshold = base.calibration.min_trial_duration_us;
    let config = base
        .with_contention(contention)
        .with_padding(padding)
        .with_discovered_workgroups()
        .with_adaptive(threshold);
    config.validate()?;

    for index in selected {
        writeln!(output)?;
        session.run(index, &config, mode).await?;
    }
    Ok(())
}

/// List `names` 1-based and read a space-separated selection.
///
/// Out-of-range and non-numeric choices are reported and skipped; duplicates
/// collapse. Returns 0-based indices in the order given.
pub fn select_devices<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    names: &[String],
) -> CliResult<Vec<usize>> {
    writeln!(output, "{}:", "Available devices".bright_white().underline())?;
    for (i, name) in names.iter().enumerate() {
        writeln!(output, "  [{}] {}", i + 1, name)?;
    }
    write!(output, "Select devices (space-separated numbers): ")?;
    output.flush()?;

    let line = read_line(input)?;
    let mut selected = Vec::new();
    for token in line.split_whitespace() {
        match token.parse::<usize>() {
            Ok(n) if (1..=names.len()).contains(&n) => {
                if !selected.contains(&(n - 1)) {
                    selected.push(n - 1);
                }
            }
            _ => writeln!(output, "  ignoring invalid choice '{}'", token)?,
        }
    }

    if selected.is_empty() {
        return Err(CliError::NothingSelected);
    }
    Ok(selected)
}

/// Ask for a positive integer until one is given.
pub fn prompt_positive<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
) -> CliResult<u32> {
    loop {
        write!(output, "{}: ", label)?;
        output.flush()?;
        match parse_positive(&read_line(input)?) {
            Ok(value) => return Ok(value),
            Err(reason) => writeln!(output, "  {}, try again", reason)?,
        }
    }
}

fn read_line<R: BufRead>(input: &mut R) -> CliResult<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(CliError::Prompt("input closed".to_string()));
    }
    Ok(line)
}
