use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use rprofile_scheduler::{
    CrontabTarget, Elevation, FailedOperation, SchedulerConfig, SchedulerError,
};
use tracing::{info, warn};

/// Set in the environment of the elevated process so it never elevates again.
pub const ELEVATED_ENV: &str = "RPROFILE_ELEVATED";

const USER_CRONTAB_HINT: &str =
    "the user crontab is not edited through sudo, use a \"crontab:<user>:<path>\" scheduler instead";

/// Subcommand re-run under `sudo`, without its profile selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevatedCommand {
    Schedule { no_start: bool, reload: bool },
    Unschedule { legacy: bool },
    Status { legacy: bool },
}

/// Re-runs the failed operation alone under `sudo`.
pub struct SudoElevation {
    executable: PathBuf,
    config: PathBuf,
    command: ElevatedCommand,
    log_flags: Vec<&'static str>,
}

impl SudoElevation {
    pub fn new(executable: PathBuf, config: PathBuf, command: ElevatedCommand) -> Self {
        Self {
            executable,
            config,
            command,
            log_flags: Vec::new(),
        }
    }

    pub fn with_log_flags(mut self, verbose: bool, quiet: bool, no_ansi: bool) -> Self {
        self.log_flags.clear();
        if verbose {
            self.log_flags.push("--verbose");
        }
        if quiet {
            self.log_flags.push("--quiet");
        }
        if no_ansi {
            self.log_flags.push("--no-ansi");
        }
        self
    }

    /// Command line running `operation` and nothing else.
    ///
    /// An operation over every recorded job (empty profile) runs with `--all`
    /// under the current protocol.
    fn arguments(&self, operation: FailedOperation<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.log_flags.iter().map(OsString::from).collect();
        args.push("--config".into());
        args.push(self.config.clone().into_os_string());
        if !operation.profile.is_empty() {
            args.push("--name".into());
            args.push(operation.profile.into());
        }

        let (subcommand, legacy) = match self.command {
            ElevatedCommand::Schedule { no_start, reload } => {
                args.push("schedule".into());
                if no_start {
                    args.push("--no-start".into());
                }
                if reload {
                    args.push("--reload".into());
                }
                return args;
            }
            ElevatedCommand::Unschedule { legacy } => ("unschedule", legacy),
            ElevatedCommand::Status { legacy } => ("status", legacy),
        };
        args.push(subcommand.into());
        if operation.profile.is_empty() {
            args.push("--all".into());
        } else if legacy {
            args.push("--legacy".into());
        }
        args
    }

    fn already_elevated() -> bool {
        std::env::var_os(ELEVATED_ENV).is_some_and(|v| v == "1")
    }
}

fn detail(err: SchedulerError) -> String {
    match err {
        SchedulerError::PermissionDenied(detail) => detail,
        other => other.to_string(),
    }
}

impl Elevation for SudoElevation {
    fn retry(
        &self,
        err: SchedulerError,
        operation: FailedOperation<'_>,
    ) -> rprofile_scheduler::Result<()> {
        if let SchedulerConfig::Crontab {
            target: CrontabTarget::User,
        } = operation.scheduler
        {
            return Err(SchedulerError::PermissionDenied(format!(
                "{}; {USER_CRONTAB_HINT}",
                detail(err)
            )));
        }
        if Self::already_elevated() {
            warn!("already running elevated, giving up");
            return Err(err);
        }

        let args = self.arguments(operation);
        info!(error = %err, ?args, "running the operation again with sudo");
        let status = Command::new("sudo")
            .arg(format!("{ELEVATED_ENV}=1"))
            .arg(&self.executable)
            .args(&args)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(SchedulerError::PermissionDenied(format!(
                "{} (sudo: {status})",
                detail(err)
            )))
        }
    }
}
