//! Starts restic for a job fired by the OS scheduler.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rprofile_core::GlobalSection;
use rprofile_scheduler::{ExecutionContext, ScheduledRun};
use tracing::{debug, info};

pub const LOCK_WAIT_ENV: &str = "RPROFILE_LOCK_WAIT";
pub const NO_LOCK_ENV: &str = "RPROFILE_NO_LOCK";
pub const STOP_ON_BATTERY_ENV: &str = "RPROFILE_STOP_ON_BATTERY";

/// Where the output of the restic command goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Inherit,
    File(PathBuf),
}

impl CommandOutput {
    /// `command-output` is `auto`, `console`, `log` (the schedule's log file)
    /// or the path of a file to append to.
    pub fn resolve(context: &ExecutionContext) -> Self {
        match context.command_output.as_deref() {
            None | Some("auto") | Some("console") => CommandOutput::Inherit,
            Some("log") => match &context.log_target {
                Some(log) => CommandOutput::File(PathBuf::from(log)),
                None => CommandOutput::Inherit,
            },
            Some(path) => CommandOutput::File(PathBuf::from(path)),
        }
    }
}

/// Environment handed to restic for the lock and battery policies.
pub fn environment(
    context: &ExecutionContext,
    default_lock_wait: Option<Duration>,
) -> Vec<(&'static str, String)> {
    let mut env = Vec::new();
    if context.no_lock {
        env.push((NO_LOCK_ENV, "1".to_string()));
    } else if let Some(wait) = context.lock_wait.or(default_lock_wait) {
        env.push((LOCK_WAIT_ENV, wait.as_secs().to_string()));
    }
    if let Some(threshold) = context.stop_on_battery {
        env.push((STOP_ON_BATTERY_ENV, threshold.to_string()));
    }
    env
}

/// Run the fired command to completion.
pub fn launch(run: &ScheduledRun, global: &GlobalSection) -> Result<()> {
    let mut command = Command::new(&global.restic_binary);
    command.arg(run.command()).args(&run.arguments);
    for (key, value) in environment(&run.context, global.default_lock_wait) {
        debug!(%key, %value, "run environment");
        command.env(key, value);
    }

    if let CommandOutput::File(path) = CommandOutput::resolve(&run.context) {
        let file = append(&path)?;
        command
            .stdout(Stdio::from(file.try_clone()?))
            .stderr(Stdio::from(file));
    }

    info!(origin = %run.origin, kind = %run.kind, binary = %global.restic_binary, "starting scheduled run");
    let status = command
        .status()
        .with_context(|| format!("cannot start '{}'", global.restic_binary))?;
    if !status.success() {
        bail!("{} {}: {status}", global.restic_binary, run.command());
    }
    info!(origin = %run.origin, "scheduled run finished");
    Ok(())
}

pub fn append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))
}
