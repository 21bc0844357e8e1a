use rprofile_core::{
    ConfigProvider, Diagnostics, Schedulable, SchedulableKind, Schedule, ScheduleOrigin,
};
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::handler::SchedulerConfig;

/// The jobs of one profile or group, with the backend they belong to.
#[derive(Debug, Clone)]
pub struct JobSet {
    pub scheduler: SchedulerConfig,
    pub kind: SchedulableKind,
    pub name: String,
    pub schedules: Vec<Schedule>,
}

/// Look `name` up as a profile first, then as a group.
///
/// The entity is loaded as declared; nothing is expanded or resolved.
pub fn load_schedulable<C>(config: &C, name: &str) -> Result<Schedulable>
where
    C: ConfigProvider + ?Sized,
{
    if config.has_profile(name) {
        let profile = config.get_profile(name).map_err(|source| {
            if source.is_not_found() {
                SchedulerError::ProfileNotFound {
                    name: name.to_string(),
                }
            } else {
                SchedulerError::LoadProfile {
                    name: name.to_string(),
                    source,
                }
            }
        })?;
        Ok(profile.into())
    } else if config.has_profile_group(name) {
        let group = config.get_profile_group(name).map_err(|source| {
            if source.is_not_found() {
                SchedulerError::GroupNotFound {
                    name: name.to_string(),
                }
            } else {
                SchedulerError::LoadGroup {
                    name: name.to_string(),
                    source,
                }
            }
        })?;
        Ok(group.into())
    } else {
        Err(SchedulerError::NotFound {
            name: name.to_string(),
        })
    }
}

/// Resolve `name` to its backend and declared schedules.
///
/// Deprecation notices of a profile are pushed to `diagnostics`.
pub fn resolve_schedulable<C>(
    config: &C,
    name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<(JobSet, Schedulable)>
where
    C: ConfigProvider + ?Sized,
{
    let global = config.global_section().map_err(SchedulerError::Global)?;
    let schedulable = load_schedulable(config, name)?;
    if let Schedulable::Profile(profile) = &schedulable {
        diagnostics.extend_warnings(profile.deprecation_notices().iter().cloned());
    }
    let jobs = JobSet {
        scheduler: SchedulerConfig::from_global(&global),
        kind: schedulable.kind(),
        name: name.to_string(),
        schedules: schedulable.declared_schedules(),
    };
    Ok((jobs, schedulable))
}

/// Jobs that should exist for `name`. May be empty.
pub fn build_create_set<C>(config: &C, name: &str, diagnostics: &mut Diagnostics) -> Result<JobSet>
where
    C: ConfigProvider + ?Sized,
{
    resolve_schedulable(config, name, diagnostics).map(|(jobs, _)| jobs)
}

/// Jobs to remove for `name`: the declared schedules, then a remove-only
/// placeholder for every schedulable command that is not declared anymore
/// but may still be installed from an older configuration.
pub fn build_remove_set<C>(config: &C, name: &str, diagnostics: &mut Diagnostics) -> Result<JobSet>
where
    C: ConfigProvider + ?Sized,
{
    let (mut jobs, schedulable) = resolve_schedulable(config, name, diagnostics)?;
    for command in schedulable.schedulable_commands() {
        let declared = jobs
            .schedules
            .iter()
            .any(|s| s.origin().command == *command);
        if !declared {
            let origin = ScheduleOrigin::new(name, *command);
            debug!(%origin, "adding remove-only job");
            jobs.schedules
                .push(Schedule::remove_only(origin, config.config_file()));
        }
    }
    Ok(jobs)
}
