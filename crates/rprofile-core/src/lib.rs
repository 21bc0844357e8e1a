//! `rprofile-core`: configuration model shared by the rprofile crates.
//!
//! Profiles and groups are read from a TOML file (with `RPROFILE_*`
//! environment overrides) and materialized on demand into [`Profile`] and
//! [`Group`] values, both viewed through [`Schedulable`] by the scheduling
//! code.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod schedulable;
pub mod types;

pub use config::{Config, ConfigProvider, GlobalSection};
pub use diagnostics::{Diagnostics, Notice, Severity};
pub use error::{ConfigError, Result};
pub use schedulable::{Group, Profile, Schedulable, SchedulableKind};
pub use types::{
    LockMode, Permission, Schedule, ScheduleOrigin, ScheduleSource, SCHEDULABLE_COMMANDS,
};
