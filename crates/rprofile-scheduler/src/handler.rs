use std::path::{Path, PathBuf};

use rprofile_core::{GlobalSection, Schedule};
use tracing::warn;

use crate::error::Result;

/// Where the crontab backend keeps its entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrontabTarget {
    /// The invoking user's crontab, through the `crontab` binary.
    User,
    /// A crontab file such as `/etc/cron.d/rprofile`. System crontab files
    /// carry a user column, set with `crontab:<user>:<path>`.
    File { path: PathBuf, user: Option<String> },
}

/// Selects and parameterizes the scheduler backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerConfig {
    Crontab { target: CrontabTarget },
}

impl SchedulerConfig {
    /// Build from the `scheduler` value of the global section.
    ///
    /// Accepted values: empty or `crontab` for the user crontab,
    /// `crontab:<path>` for a crontab file and `crontab:<user>:<path>` for a
    /// system crontab file. Anything else falls back to the user crontab with
    /// a warning.
    pub fn from_global(global: &GlobalSection) -> Self {
        let value = global.scheduler.as_str();
        let target = match value.split_once(':') {
            None if value.is_empty() || value == "crontab" => CrontabTarget::User,
            Some(("crontab", "")) | Some(("crontab", "-")) => CrontabTarget::User,
            Some(("crontab", rest)) => match rest.split_once(':') {
                Some((user, path)) if !user.is_empty() && !user.contains('/') => {
                    CrontabTarget::File {
                        path: PathBuf::from(path),
                        user: Some(user.to_string()),
                    }
                }
                _ => CrontabTarget::File {
                    path: PathBuf::from(rest),
                    user: None,
                },
            },
            _ => {
                warn!(scheduler = %value, "unsupported scheduler, using the user crontab");
                CrontabTarget::User
            }
        };
        SchedulerConfig::Crontab { target }
    }
}

/// OS scheduler backend.
///
/// A handler is built per dispatch from a [`SchedulerConfig`] and owns its
/// backend's job store; callers only hand it job definitions.
pub trait SchedulerHandler {
    fn create_jobs(&mut self, jobs: &[Schedule]) -> Result<()>;
    fn remove_jobs(&mut self, jobs: &[Schedule]) -> Result<()>;
    fn report_status(&mut self, profile: &str, jobs: &[Schedule]) -> Result<()>;
    /// Remove every job recorded for `config_file`, limited to `profile`
    /// unless it is empty.
    fn remove_all_recorded(&mut self, config_file: &Path, profile: &str) -> Result<()>;
    fn report_all_recorded(&mut self, config_file: &Path, profile: &str) -> Result<()>;
}

/// Builds handlers for the reconciler.
pub trait HandlerFactory {
    fn handler(&self, config: &SchedulerConfig) -> Box<dyn SchedulerHandler + '_>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&SchedulerConfig) -> Box<dyn SchedulerHandler>,
{
    fn handler(&self, config: &SchedulerConfig) -> Box<dyn SchedulerHandler + '_> {
        self(config)
    }
}
