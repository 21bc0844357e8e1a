use std::time::Duration;

use rprofile_core::{ConfigProvider, LockMode, SchedulableKind, Schedule, ScheduleOrigin};
use tracing::debug;

use crate::error::{Result, SchedulerError, MALFORMED_IDENTITY, MISSING_IDENTITY};
use crate::jobs::load_schedulable;

/// Overrides a scheduled run layers on top of the run pipeline defaults.
///
/// Every field left at its default means "use the pipeline's own value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub log_target: Option<String>,
    pub command_output: Option<String>,
    /// Skip the run on battery below this percentage; 100 skips it on battery always.
    pub stop_on_battery: Option<u8>,
    pub lock_wait: Option<Duration>,
    pub no_lock: bool,
}

impl ExecutionContext {
    /// Derive the overrides declared by `schedule`.
    pub fn apply_schedule(&mut self, schedule: &Schedule) {
        if let Some(log) = schedule.log.as_deref().filter(|s| !s.is_empty()) {
            self.log_target = Some(log.to_string());
        }
        if let Some(output) = schedule.command_output.as_deref().filter(|s| !s.is_empty()) {
            self.command_output = Some(output.to_string());
        }

        let threshold = schedule.ignore_on_battery_less_than.filter(|t| *t > 0);
        match (threshold, schedule.ignore_on_battery) {
            (Some(threshold), ignore) if ignore != Some(false) => {
                self.stop_on_battery = Some(threshold)
            }
            (_, Some(true)) => self.stop_on_battery = Some(100),
            _ => {}
        }

        match schedule.lock_mode {
            LockMode::Default => {
                if let Some(wait) = schedule.lock_wait.filter(|w| !w.is_zero()) {
                    self.lock_wait = Some(wait);
                }
            }
            LockMode::Ignore => self.no_lock = true,
            LockMode::Fail => {}
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// A fired job, ready for the run pipeline.
#[derive(Debug, Clone)]
pub struct ScheduledRun {
    pub origin: ScheduleOrigin,
    pub kind: SchedulableKind,
    /// `None` when the owner declares no schedule for the command anymore.
    pub schedule: Option<Schedule>,
    pub context: ExecutionContext,
    /// Arguments after the job token, handed to the command unchanged.
    pub arguments: Vec<String>,
}

impl ScheduledRun {
    pub fn command(&self) -> &str {
        &self.origin.command
    }

    pub fn profile(&self) -> &str {
        &self.origin.name
    }
}

/// Turn the `<command>@<name>` token a scheduler fired with back into a run.
///
/// `args[0]` is the token. The owner is loaded as declared, without
/// resolving anything else. A command the owner no longer schedules is not
/// an error: the run proceeds with the pipeline defaults.
pub fn rehydrate<C>(config: &C, args: &[String]) -> Result<ScheduledRun>
where
    C: ConfigProvider + ?Sized,
{
    let (token, arguments) = args
        .split_first()
        .ok_or(SchedulerError::MalformedIdentity(MISSING_IDENTITY))?;
    let origin =
        ScheduleOrigin::parse(token).ok_or(SchedulerError::MalformedIdentity(MALFORMED_IDENTITY))?;

    let schedulable = load_schedulable(config, &origin.name)?;
    let kind = schedulable.kind();
    debug!("preparing scheduled {kind} {origin}");

    let schedule = schedulable.schedules().get(&origin.command).cloned();
    let mut context = ExecutionContext::default();
    match &schedule {
        Some(schedule) => context.apply_schedule(schedule),
        None => debug!(%origin, "no schedule declared, running with defaults"),
    }

    Ok(ScheduledRun {
        origin,
        kind,
        schedule,
        context,
        arguments: arguments.to_vec(),
    })
}
