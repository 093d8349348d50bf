//! `atomprobe devices` - list devices the backend can open.

use colored::Colorize;

use crate::error::CliResult;

use super::Session;

/// Execute the `devices` command.
pub fn execute(session: &Session) -> CliResult<()> {
    let names = session.device_names()?;
    if names.is_empty() {
        println!("{} No devices found", "Warning:".yellow());
        return Ok(());
    }

    println!("{}:", "Devices".bright_white().underline());
    for (index, name) in names.iter().enumerate() {
        println!("  {} {}", format!("{:>2}:", index).bright_cyan(), name);
    }
    Ok(())
}
