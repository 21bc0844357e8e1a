use rprofile_core::{ConfigProvider, Diagnostics};
use tracing::{debug, info, warn};

use crate::{
    elevation::{with_elevation, Elevation, FailedOperation},
    error::{Result, SchedulerError},
    handler::{HandlerFactory, SchedulerConfig},
    jobs::{build_create_set, build_remove_set, JobSet},
    select::select_profiles_and_groups,
};

pub const LEGACY_FLAG_WARNING: &str =
    "the --legacy flag is only temporary and will be removed in version 1.0.0";

/// Command line intent shared by `schedule`, `unschedule` and `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleRequest {
    /// Profile or group the command targets when `all` is not set.
    pub profile: String,
    pub all: bool,
    pub no_start: bool,
    pub reload: bool,
    pub legacy: bool,
}

impl ScheduleRequest {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            ..Self::default()
        }
    }

    /// Profile filter of the recorded-jobs protocol: empty selects every profile.
    fn profile_filter(&self) -> &str {
        if self.all {
            ""
        } else {
            &self.profile
        }
    }
}

/// Brings the scheduler backend in line with the configuration.
///
/// Every operation runs to completion on the calling thread, one profile or
/// group at a time. Notices that must reach the user without failing the
/// command are pushed to the [`Diagnostics`] the caller flushes.
pub struct Reconciler<'a> {
    config: &'a dyn ConfigProvider,
    handlers: &'a dyn HandlerFactory,
    elevation: &'a dyn Elevation,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a dyn ConfigProvider,
        handlers: &'a dyn HandlerFactory,
        elevation: &'a dyn Elevation,
    ) -> Self {
        Self {
            config,
            handlers,
            elevation,
        }
    }

    /// Install the declared jobs of the selected profiles and groups.
    ///
    /// Every name is resolved before anything is dispatched, so a profile that
    /// fails to load leaves the scheduler untouched.
    pub fn create(&self, request: &ScheduleRequest, diagnostics: &mut Diagnostics) -> Result<()> {
        let result = self.create_selected(request, diagnostics);
        self.push_config_issues(diagnostics);
        result
    }

    fn create_selected(
        &self,
        request: &ScheduleRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let names = select_profiles_and_groups(self.config, &request.profile, request.all);
        let mut pending: Vec<JobSet> = Vec::with_capacity(names.len());

        for name in &names {
            let mut jobs = build_create_set(self.config, name, diagnostics)?;
            if jobs.schedules.is_empty() {
                if request.all {
                    debug!(kind = %jobs.kind, %name, "no schedule, skipping");
                    continue;
                }
                return Err(SchedulerError::NoScheduleFound { name: name.clone() });
            }
            for schedule in &mut jobs.schedules {
                if request.no_start {
                    schedule.set_flag("no-start", "");
                }
                if request.reload {
                    schedule.set_flag("reload", "");
                }
            }
            pending.push(jobs);
        }

        for jobs in &pending {
            if let Some(placeholder) = jobs.schedules.iter().find(|s| !s.is_declared()) {
                return Err(SchedulerError::RemoveOnlyJob {
                    origin: placeholder.origin().clone(),
                });
            }
            info!(kind = %jobs.kind, name = %jobs.name, count = jobs.schedules.len(), "creating jobs");
            let operation = FailedOperation {
                scheduler: &jobs.scheduler,
                profile: &jobs.name,
            };
            with_elevation(self.elevation, operation, || {
                self.handlers
                    .handler(&jobs.scheduler)
                    .create_jobs(&jobs.schedules)
            })?;
        }
        Ok(())
    }

    /// Remove scheduled jobs.
    ///
    /// The current protocol asks the backend to drop every job it recorded
    /// for this configuration file. With `legacy`, each selected profile is
    /// reconciled on its own instead; a profile the backend fails on is
    /// reported and the others are still processed.
    pub fn remove(&self, request: &ScheduleRequest, diagnostics: &mut Diagnostics) -> Result<()> {
        let result = if request.legacy {
            diagnostics.warn(LEGACY_FLAG_WARNING);
            self.remove_legacy(request, diagnostics)
        } else {
            self.global_scheduler().and_then(|scheduler| {
                let config_file = self.config.config_file();
                let filter = request.profile_filter();
                let operation = FailedOperation {
                    scheduler: &scheduler,
                    profile: filter,
                };
                with_elevation(self.elevation, operation, || {
                    self.handlers
                        .handler(&scheduler)
                        .remove_all_recorded(config_file, filter)
                })
            })
        };
        self.push_config_issues(diagnostics);
        result
    }

    fn remove_legacy(
        &self,
        request: &ScheduleRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let names = select_profiles_and_groups(self.config, &request.profile, request.all);
        for name in &names {
            let jobs = build_remove_set(self.config, name, diagnostics)?;
            let operation = FailedOperation {
                scheduler: &jobs.scheduler,
                profile: name,
            };
            let removed = with_elevation(self.elevation, operation, || {
                self.handlers
                    .handler(&jobs.scheduler)
                    .remove_jobs(&jobs.schedules)
            });
            if let Err(err) = removed {
                diagnostics.error(format!("{} '{name}': {err}", jobs.kind));
            }
        }
        Ok(())
    }

    /// Report the state of the scheduled jobs.
    ///
    /// With `legacy`, the declared jobs of the selected profiles are reported
    /// one profile at a time. A single profile ends there; with `all`, the
    /// recorded jobs are reported afterwards as well unless the global
    /// `legacy-then-current` setting is turned off.
    pub fn status(&self, request: &ScheduleRequest, diagnostics: &mut Diagnostics) -> Result<()> {
        let result = self.report(request, diagnostics);
        self.push_config_issues(diagnostics);
        result
    }

    fn report(&self, request: &ScheduleRequest, diagnostics: &mut Diagnostics) -> Result<()> {
        let global = self.config.global_section().map_err(SchedulerError::Global)?;

        if request.legacy {
            diagnostics.warn(LEGACY_FLAG_WARNING);
            if !request.all {
                return self.report_legacy_single(&request.profile, diagnostics);
            }
            self.report_legacy_all(request, diagnostics)?;
            if !global.legacy_then_current {
                return Ok(());
            }
        }

        let scheduler = SchedulerConfig::from_global(&global);
        let config_file = self.config.config_file();
        let filter = request.profile_filter();
        let operation = FailedOperation {
            scheduler: &scheduler,
            profile: filter,
        };
        with_elevation(self.elevation, operation, || {
            self.handlers
                .handler(&scheduler)
                .report_all_recorded(config_file, filter)
        })
    }

    fn report_legacy_single(&self, name: &str, diagnostics: &mut Diagnostics) -> Result<()> {
        let jobs = build_create_set(self.config, name, diagnostics)?;
        if jobs.schedules.is_empty() {
            warn!(kind = %jobs.kind, %name, "no schedule found");
            return Ok(());
        }
        let operation = FailedOperation {
            scheduler: &jobs.scheduler,
            profile: name,
        };
        with_elevation(self.elevation, operation, || {
            self.handlers
                .handler(&jobs.scheduler)
                .report_status(name, &jobs.schedules)
        })
    }

    fn report_legacy_all(
        &self,
        request: &ScheduleRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let names = select_profiles_and_groups(self.config, &request.profile, true);
        for name in &names {
            let jobs = build_create_set(self.config, name, diagnostics)?;
            if jobs.schedules.is_empty() {
                continue;
            }
            info!("{} {:?}:", jobs.kind.title(), name);
            let operation = FailedOperation {
                scheduler: &jobs.scheduler,
                profile: name,
            };
            let reported = with_elevation(self.elevation, operation, || {
                self.handlers
                    .handler(&jobs.scheduler)
                    .report_status(name, &jobs.schedules)
            });
            if let Err(err) = reported {
                diagnostics.error(format!("{} '{name}': {err}", jobs.kind));
            }
        }
        Ok(())
    }

    fn global_scheduler(&self) -> Result<SchedulerConfig> {
        let global = self.config.global_section().map_err(SchedulerError::Global)?;
        Ok(SchedulerConfig::from_global(&global))
    }

    fn push_config_issues(&self, diagnostics: &mut Diagnostics) {
        diagnostics.extend_warnings(self.config.configuration_issues());
    }
}
