use tracing::warn;

use crate::error::{Result, SchedulerError};
use crate::handler::SchedulerConfig;

/// The scheduler operation that failed on permissions.
#[derive(Debug, Clone, Copy)]
pub struct FailedOperation<'a> {
    pub scheduler: &'a SchedulerConfig,
    /// Profile or group the operation ran for; empty when it covered every
    /// profile recorded for the configuration file.
    pub profile: &'a str,
}

/// Second chance for an operation that failed on permissions.
pub trait Elevation {
    /// Re-run `operation` with elevated privileges, once.
    ///
    /// Only called with errors for which
    /// [`SchedulerError::is_permission_denied`] holds.
    fn retry(&self, err: SchedulerError, operation: FailedOperation<'_>) -> Result<()>;
}

/// Never elevates: the original error is returned unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl Elevation for PassThrough {
    fn retry(&self, err: SchedulerError, _operation: FailedOperation<'_>) -> Result<()> {
        Err(err)
    }
}

/// Run `op`; if it fails on permissions, give `elevation` one retry of
/// `operation`.
///
/// Any other error is returned as-is.
pub fn with_elevation<E, F>(elevation: &E, operation: FailedOperation<'_>, op: F) -> Result<()>
where
    E: Elevation + ?Sized,
    F: FnOnce() -> Result<()>,
{
    match op() {
        Ok(()) => Ok(()),
        Err(err) if err.is_permission_denied() => {
            warn!(error = %err, profile = %operation.profile, "retrying with elevated privileges");
            elevation.retry(err, operation)
        }
        Err(err) => Err(err),
    }
}
