use rprofile_core::{ConfigError, ScheduleOrigin};
use thiserror::Error;

pub const MISSING_IDENTITY: &str = "run-schedule command expects one argument: schedule name";
pub const MALFORMED_IDENTITY: &str =
    "the expected format of the schedule name is <command>@<profile-or-group-name>";

/// Errors raised while reconciling schedules or preparing a scheduled run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("cannot load global section: {0}")]
    Global(#[source] ConfigError),

    /// Neither a profile nor a group carries this name.
    #[error("profile or group '{name}': not found")]
    NotFound { name: String },

    #[error("profile '{name}': not found")]
    ProfileNotFound { name: String },

    #[error("cannot load profile '{name}': {source}")]
    LoadProfile { name: String, source: ConfigError },

    #[error("group '{name}' not found")]
    GroupNotFound { name: String },

    #[error("cannot load group '{name}': {source}")]
    LoadGroup { name: String, source: ConfigError },

    #[error("no schedule found for profile '{name}'")]
    NoScheduleFound { name: String },

    /// The job token given to `run-schedule` is missing or not `<command>@<name>`.
    #[error("{0}")]
    MalformedIdentity(&'static str),

    /// The scheduler backend needs elevated privileges.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("scheduler error: {0}")]
    Handler(String),

    #[error("invalid schedule for {origin}: {reason}")]
    InvalidSchedule {
        origin: ScheduleOrigin,
        reason: String,
    },

    /// A placeholder synthesized for removal reached the create path.
    #[error("refusing to install remove-only job {origin}")]
    RemoveOnlyJob { origin: ScheduleOrigin },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    pub fn is_permission_denied(&self) -> bool {
        match self {
            SchedulerError::PermissionDenied(_) => true,
            SchedulerError::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Profile or group missing, under any of the lookups.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::NotFound { .. }
                | SchedulerError::ProfileNotFound { .. }
                | SchedulerError::GroupNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
