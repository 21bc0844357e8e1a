//! `rprofile-scheduler`: reconciles declared backup schedules with the OS
//! scheduler and prepares the runs it fires.
//!
//! # Overview
//!
//! A command selects profiles and groups ([`select`]), turns each one into a
//! [`jobs::JobSet`] and hands it to a [`handler::SchedulerHandler`] through the
//! [`engine::Reconciler`]. When the OS scheduler fires a job it calls back with
//! a `<command>@<name>` token, which [`context::rehydrate`] turns into a
//! [`context::ScheduledRun`].
//!
//! # Protocols
//!
//! | Operation | Current                                  | `--legacy`                              |
//! |-----------|------------------------------------------|-----------------------------------------|
//! | remove    | drop every job recorded for the file     | per profile, best effort                |
//! | status    | report every job recorded for the file   | per profile, then recorded jobs (`all`) |
//!
//! Creation always goes profile by profile.

pub mod context;
pub mod crontab;
pub mod elevation;
pub mod engine;
pub mod error;
pub mod handler;
pub mod jobs;
pub mod select;

pub use context::{rehydrate, ExecutionContext, ScheduledRun};
pub use crontab::CrontabHandler;
pub use elevation::{with_elevation, Elevation, FailedOperation, PassThrough};
pub use engine::{Reconciler, ScheduleRequest, LEGACY_FLAG_WARNING};
pub use error::{Result, SchedulerError};
pub use handler::{CrontabTarget, HandlerFactory, SchedulerConfig, SchedulerHandler};
pub use jobs::{build_create_set, build_remove_set, JobSet};
pub use select::{select, select_profiles_and_groups};
