#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use rprofile_core::{Config, Schedule};
use rprofile_scheduler::{
    Elevation, FailedOperation, HandlerFactory, SchedulerConfig, SchedulerError, SchedulerHandler,
};

pub const CONFIG_FILE: &str = "/cfg/profiles.toml";

pub fn config(toml: &str) -> Config {
    Config::from_toml_str(CONFIG_FILE, toml).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(Vec<Schedule>),
    Remove(Vec<Schedule>),
    Status(String, Vec<Schedule>),
    RemoveAll(PathBuf, String),
    ReportAll(PathBuf, String),
}

impl Call {
    /// Profile or group the call was made for; the filter for recorded-jobs calls.
    pub fn target(&self) -> &str {
        match self {
            Call::Create(jobs) | Call::Remove(jobs) => {
                jobs.first().map(|s| s.origin().name.as_str()).unwrap_or("")
            }
            Call::Status(name, _) => name.as_str(),
            Call::RemoveAll(_, filter) | Call::ReportAll(_, filter) => filter.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Handler,
    Permission,
}

/// Handler factory recording every call its handlers receive.
#[derive(Default)]
pub struct Recorder {
    pub calls: RefCell<Vec<Call>>,
    pub schedulers: RefCell<Vec<SchedulerConfig>>,
    failures: RefCell<Vec<(String, Failure)>>,
}

impl Recorder {
    /// Make every call targeting `name` fail.
    pub fn fail_for(&self, name: &str, failure: Failure) {
        self.failures.borrow_mut().push((name.to_string(), failure));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.target().to_string()).collect()
    }

    fn record(&self, call: Call) -> rprofile_scheduler::Result<()> {
        let failure = self
            .failures
            .borrow()
            .iter()
            .find(|(name, _)| name == call.target())
            .map(|(_, failure)| *failure);
        self.calls.borrow_mut().push(call);
        match failure {
            None => Ok(()),
            Some(Failure::Handler) => Err(SchedulerError::Handler("boom".into())),
            Some(Failure::Permission) => Err(SchedulerError::PermissionDenied("crontab".into())),
        }
    }
}

impl HandlerFactory for Recorder {
    fn handler(&self, config: &SchedulerConfig) -> Box<dyn SchedulerHandler + '_> {
        self.schedulers.borrow_mut().push(config.clone());
        Box::new(FakeHandler { recorder: self })
    }
}

struct FakeHandler<'a> {
    recorder: &'a Recorder,
}

impl SchedulerHandler for FakeHandler<'_> {
    fn create_jobs(&mut self, jobs: &[Schedule]) -> rprofile_scheduler::Result<()> {
        self.recorder.record(Call::Create(jobs.to_vec()))
    }

    fn remove_jobs(&mut self, jobs: &[Schedule]) -> rprofile_scheduler::Result<()> {
        self.recorder.record(Call::Remove(jobs.to_vec()))
    }

    fn report_status(
        &mut self,
        profile: &str,
        jobs: &[Schedule],
    ) -> rprofile_scheduler::Result<()> {
        self.recorder
            .record(Call::Status(profile.to_string(), jobs.to_vec()))
    }

    fn remove_all_recorded(
        &mut self,
        config_file: &Path,
        profile: &str,
    ) -> rprofile_scheduler::Result<()> {
        self.recorder
            .record(Call::RemoveAll(config_file.to_path_buf(), profile.to_string()))
    }

    fn report_all_recorded(
        &mut self,
        config_file: &Path,
        profile: &str,
    ) -> rprofile_scheduler::Result<()> {
        self.recorder
            .record(Call::ReportAll(config_file.to_path_buf(), profile.to_string()))
    }
}

/// Elevation that counts retries and succeeds or fails on demand.
pub struct FakeElevation {
    pub retries: Cell<u32>,
    /// Profile of every retried operation, empty for all recorded jobs.
    pub retried: RefCell<Vec<String>>,
    pub succeed: bool,
}

impl FakeElevation {
    pub fn succeeding() -> Self {
        Self {
            retries: Cell::new(0),
            retried: RefCell::new(Vec::new()),
            succeed: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            retries: Cell::new(0),
            retried: RefCell::new(Vec::new()),
            succeed: false,
        }
    }

    pub fn retried(&self) -> Vec<String> {
        self.retried.borrow().clone()
    }
}

impl Elevation for FakeElevation {
    fn retry(
        &self,
        err: SchedulerError,
        operation: FailedOperation<'_>,
    ) -> rprofile_scheduler::Result<()> {
        self.retries.set(self.retries.get() + 1);
        self.retried.borrow_mut().push(operation.profile.to_string());
        if self.succeed {
            Ok(())
        } else {
            Err(err)
        }
    }
}
