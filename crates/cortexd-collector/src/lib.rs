//! Host-health collectors for the cortexd monitor.
//!
//! Each collector reads one observable facet of the local host: CPU from
//! `/proc/stat`, memory from `/proc/meminfo`, disk via `statvfs`, pending
//! package updates from apt, and CVE exposure from the distribution's
//! security tooling. Collectors never fail the monitor cycle: unreadable
//! sources degrade to zeroed stats or empty lists.

pub mod apt;
pub mod cpu;
pub mod cve;
pub mod disk;
pub mod memory;

use anyhow::{Context, Result};
use std::process::Command;

/// Run an external command and capture stdout as UTF-8, discarding stderr.
pub(crate) fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to run {program}"))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether a command is resolvable on PATH.
pub(crate) fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
