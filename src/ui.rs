use std::io::{self, BufRead, Write};

use anyhow::Result;
use dialoguer::console::style;

pub enum CommandStatus {
    Success,
    Error,
}

pub fn print_command_status(status: CommandStatus, message: &str) {
    let indicator = match &status {
        CommandStatus::Success => style("✓").green(),
        CommandStatus::Error => style("✗").red(),
    };
    eprintln!("{indicator} {message}");
}

/// Interactive gate in front of a live (non-dry-run) mutation. Returns
/// whether the operator typed the confirmation phrase.
pub fn confirm_live_run() -> Result<bool> {
    println!(
        "{}",
        style("You are about to do a non-dry run, please type YOLO:").red()
    );
    print!("> ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "YOLO")
}
