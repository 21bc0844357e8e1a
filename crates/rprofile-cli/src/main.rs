//! rprofile - schedule restic backup profiles with the OS scheduler.
//!
//! Usage:
//!   rprofile --name home schedule          Install the jobs of profile "home"
//!   rprofile unschedule --all              Remove every job installed from the file
//!   rprofile status --all --legacy         Report per profile, then recorded jobs
//!   rprofile run-schedule backup@home      Called by the scheduler when a job fires

mod elevation;
mod launcher;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rprofile_core::{Config, ConfigProvider, Diagnostics};
use rprofile_scheduler::{
    rehydrate, CrontabHandler, Reconciler, ScheduleRequest, SchedulerConfig, SchedulerHandler,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use elevation::{ElevatedCommand, SudoElevation};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RPROFILE_GIT_SHA"), ")");

#[derive(Parser)]
#[command(name = "rprofile", version = VERSION, about = "Schedule restic backup profiles")]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "RPROFILE_CONFIG",
        default_value = rprofile_core::config::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Profile or group to act on
    #[arg(short, long, global = true, default_value = "default")]
    name: String,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Plain log output, as used by installed jobs
    #[arg(long, global = true)]
    no_ansi: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct Selection {
    /// Every profile and group of the configuration file
    #[arg(long)]
    all: bool,

    /// Use the per-profile protocol (temporary)
    #[arg(long)]
    legacy: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the scheduled jobs of a profile or group
    Schedule {
        /// Every profile and group of the configuration file
        #[arg(long)]
        all: bool,

        /// Do not start the jobs right after installing them
        #[arg(long)]
        no_start: bool,

        /// Re-install jobs even when they did not change
        #[arg(long)]
        reload: bool,
    },

    /// Remove scheduled jobs
    Unschedule(Selection),

    /// Show the state of scheduled jobs
    Status(Selection),

    /// Run a job fired by the scheduler
    RunSchedule {
        /// `<command>@<profile-or-group>`, then arguments for the command
        #[arg(value_name = "SCHEDULE", num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config_path = std::fs::canonicalize(&cli.config).unwrap_or_else(|_| cli.config.clone());
    let config = Config::load(&config_path)?;
    debug!(path = %config.config_file().display(), "configuration loaded");

    let mut diagnostics = Diagnostics::new();
    let result = run(cli, &config, &mut diagnostics);
    diagnostics.flush();
    result
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "rprofile=debug"
    } else if cli.quiet {
        "rprofile=warn"
    } else {
        "rprofile=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_ansi(!cli.no_ansi)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli, config: &Config, diagnostics: &mut Diagnostics) -> Result<()> {
    let elevated = match &cli.command {
        Commands::Schedule {
            no_start, reload, ..
        } => ElevatedCommand::Schedule {
            no_start: *no_start,
            reload: *reload,
        },
        Commands::Unschedule(selection) => ElevatedCommand::Unschedule {
            legacy: selection.legacy,
        },
        Commands::Status(selection) => ElevatedCommand::Status {
            legacy: selection.legacy,
        },
        Commands::RunSchedule { args } => return run_schedule(config, args),
    };

    let executable = std::env::current_exe().context("cannot locate the rprofile executable")?;
    let handler_executable = executable.clone();
    let handlers = move |scheduler: &SchedulerConfig| -> Box<dyn SchedulerHandler> {
        let SchedulerConfig::Crontab { target } = scheduler;
        Box::new(CrontabHandler::new(
            target.clone(),
            handler_executable.clone(),
            io::stdout(),
        ))
    };
    let elevation = SudoElevation::new(executable, config.config_file().to_path_buf(), elevated)
        .with_log_flags(cli.verbose, cli.quiet, cli.no_ansi);
    let reconciler = Reconciler::new(config, &handlers, &elevation);

    match cli.command {
        Commands::Schedule {
            all,
            no_start,
            reload,
        } => {
            let request = ScheduleRequest {
                profile: cli.name,
                all,
                no_start,
                reload,
                legacy: false,
            };
            reconciler.create(&request, diagnostics)?;
        }
        Commands::Unschedule(selection) => {
            reconciler.remove(&selection.into_request(cli.name), diagnostics)?;
        }
        Commands::Status(selection) => {
            reconciler.status(&selection.into_request(cli.name), diagnostics)?;
        }
        Commands::RunSchedule { .. } => {}
    }
    Ok(())
}

impl Selection {
    fn into_request(self, profile: String) -> ScheduleRequest {
        ScheduleRequest {
            profile,
            all: self.all,
            legacy: self.legacy,
            ..ScheduleRequest::default()
        }
    }
}

fn run_schedule(config: &Config, args: &[String]) -> Result<()> {
    let run = rehydrate(config, args)?;
    let global = config.global_section()?;
    info!(
        origin = %run.origin,
        context = ?run.context,
        "scheduled {} {}",
        run.kind,
        run.profile()
    );

    match run.context.log_target.as_deref() {
        Some(log) => {
            let file = launcher::append(Path::new(log))?;
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("rprofile=info"))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::with_default(subscriber, || launcher::launch(&run, &global))
        }
        None => launcher::launch(&run, &global),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_schedule_keeps_hyphen_arguments() {
        let cli = Cli::try_parse_from([
            "rprofile",
            "--no-ansi",
            "--config",
            "/etc/rprofile/profiles.toml",
            "run-schedule",
            "backup@home",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.no_ansi);
        assert_eq!(cli.config, PathBuf::from("/etc/rprofile/profiles.toml"));
        match cli.command {
            Commands::RunSchedule { args } => assert_eq!(args, vec!["backup@home", "--dry-run"]),
            _ => panic!("expected run-schedule"),
        }
    }

    #[test]
    fn selection_flags() {
        let cli =
            Cli::try_parse_from(["rprofile", "--name", "home", "status", "--legacy"]).unwrap();
        let Commands::Status(selection) = cli.command else {
            panic!("expected status");
        };
        let request = selection.into_request(cli.name);
        assert_eq!(request.profile, "home");
        assert!(request.legacy && !request.all);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["rprofile", "-v", "-q", "status"]).is_err());
    }
}
