mod common;

use std::path::PathBuf;

use common::{config, Call, FakeElevation, Failure, Recorder, CONFIG_FILE};
use rprofile_core::{Diagnostics, ScheduleSource};
use rprofile_scheduler::{
    CrontabTarget, PassThrough, Reconciler, ScheduleRequest, SchedulerConfig, SchedulerError,
    LEGACY_FLAG_WARNING,
};

const THREE_PROFILES: &str = r#"
[profiles.alpha.schedules.backup]
at = "daily"
[profiles.alpha.schedules.check]
at = "weekly"
flags = { "extra" = "1" }

[profiles.empty]
description = "nothing scheduled"

[profiles.gamma.schedules.prune]
at = "monthly"
"#;

fn all() -> ScheduleRequest {
    ScheduleRequest {
        all: true,
        ..ScheduleRequest::default()
    }
}

#[test]
fn create_all_skips_profiles_without_schedules() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    let mut diagnostics = Diagnostics::new();

    Reconciler::new(&config, &recorder, &PassThrough)
        .create(&all(), &mut diagnostics)
        .unwrap();

    assert_eq!(recorder.targets(), vec!["alpha", "gamma"]);
}

#[test]
fn create_single_profile_without_schedules_is_fatal() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();

    let err = Reconciler::new(&config, &recorder, &PassThrough)
        .create(&ScheduleRequest::new("empty"), &mut Diagnostics::new())
        .unwrap_err();

    assert!(matches!(&err, SchedulerError::NoScheduleFound { name } if name == "empty"));
    assert_eq!(err.to_string(), "no schedule found for profile 'empty'");
    assert!(recorder.calls().is_empty());
}

#[test]
fn create_unknown_profile_is_not_found() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();

    let err = Reconciler::new(&config, &recorder, &PassThrough)
        .create(&ScheduleRequest::new("delta"), &mut Diagnostics::new())
        .unwrap_err();

    assert_eq!(err.to_string(), "profile or group 'delta': not found");
}

#[test]
fn create_sets_no_start_and_reload_on_every_job() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    let request = ScheduleRequest {
        no_start: true,
        reload: true,
        ..all()
    };

    Reconciler::new(&config, &recorder, &PassThrough)
        .create(&request, &mut Diagnostics::new())
        .unwrap();

    let jobs: Vec<_> = recorder
        .calls()
        .into_iter()
        .flat_map(|call| match call {
            Call::Create(jobs) => jobs,
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(jobs.len(), 3);
    for job in &jobs {
        assert_eq!(job.flag("no-start"), Some(""));
        assert_eq!(job.flag("reload"), Some(""));
        assert_eq!(job.source(), ScheduleSource::Declared);
    }
    let check = jobs.iter().find(|j| j.origin().command == "check").unwrap();
    assert_eq!(check.flag("extra"), Some("1"));
}

#[test]
fn create_resolves_everything_before_dispatching() {
    let config = config(
        r#"
[profiles.alpha.schedules.backup]
at = "daily"
[profiles.broken.schedules.backup]
at = "daily"
lock-mode = "sometimes"
"#,
    );
    let recorder = Recorder::default();

    let err = Reconciler::new(&config, &recorder, &PassThrough)
        .create(&all(), &mut Diagnostics::new())
        .unwrap_err();

    assert!(matches!(err, SchedulerError::LoadProfile { ref name, .. } if name == "broken"));
    assert!(recorder.calls().is_empty());
}

#[test]
fn create_stops_at_first_dispatch_failure() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("alpha", Failure::Handler);

    let err = Reconciler::new(&config, &recorder, &PassThrough)
        .create(&all(), &mut Diagnostics::new())
        .unwrap_err();

    assert!(matches!(err, SchedulerError::Handler(_)));
    assert_eq!(recorder.targets(), vec!["alpha"]);
}

#[test]
fn create_retries_permission_errors_once() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("gamma", Failure::Permission);
    let elevation = FakeElevation::succeeding();

    Reconciler::new(&config, &recorder, &elevation)
        .create(&ScheduleRequest::new("gamma"), &mut Diagnostics::new())
        .unwrap();
    assert_eq!(elevation.retries.get(), 1);
    assert_eq!(elevation.retried(), vec!["gamma"]);

    let elevation = FakeElevation::failing();
    let err = Reconciler::new(&config, &recorder, &elevation)
        .create(&ScheduleRequest::new("gamma"), &mut Diagnostics::new())
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert_eq!(elevation.retries.get(), 1);
}

#[test]
fn remove_all_retries_permission_errors_once() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("", Failure::Permission);

    let elevation = FakeElevation::succeeding();
    Reconciler::new(&config, &recorder, &elevation)
        .remove(&all(), &mut Diagnostics::new())
        .unwrap();
    assert_eq!(elevation.retries.get(), 1);
    assert_eq!(elevation.retried(), vec![""]);

    let elevation = FakeElevation::failing();
    let err = Reconciler::new(&config, &recorder, &elevation)
        .remove(&all(), &mut Diagnostics::new())
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert_eq!(elevation.retries.get(), 1);
}

#[test]
fn status_all_retries_permission_errors_once() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("", Failure::Permission);

    let elevation = FakeElevation::succeeding();
    Reconciler::new(&config, &recorder, &elevation)
        .status(&all(), &mut Diagnostics::new())
        .unwrap();
    assert_eq!(elevation.retries.get(), 1);
    assert_eq!(elevation.retried(), vec![""]);

    let elevation = FakeElevation::failing();
    let err = Reconciler::new(&config, &recorder, &elevation)
        .status(&all(), &mut Diagnostics::new())
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert_eq!(elevation.retries.get(), 1);
    assert_eq!(
        recorder.calls(),
        vec![
            Call::ReportAll(PathBuf::from(CONFIG_FILE), String::new()),
            Call::ReportAll(PathBuf::from(CONFIG_FILE), String::new()),
        ]
    );
}

#[test]
fn legacy_remove_logs_a_failed_elevation_and_continues() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("alpha", Failure::Permission);
    let elevation = FakeElevation::failing();
    let mut diagnostics = Diagnostics::new();
    let request = ScheduleRequest {
        legacy: true,
        ..all()
    };

    Reconciler::new(&config, &recorder, &elevation)
        .remove(&request, &mut diagnostics)
        .unwrap();

    assert_eq!(elevation.retries.get(), 1);
    assert_eq!(elevation.retried(), vec!["alpha"]);
    assert_eq!(recorder.targets(), vec!["alpha", "empty", "gamma"]);
    let errors: Vec<_> = diagnostics.errors().collect();
    assert_eq!(errors, vec!["profile 'alpha': permission denied: crontab"]);
}

#[test]
fn create_reports_configuration_issues() {
    let config = config(
        r#"
[profiles.alpha.schedules.backup]
at = "daily"
[groups.nightly]
profiles = ["alpha", "ghost"]
"#,
    );
    let recorder = Recorder::default();
    let mut diagnostics = Diagnostics::new();

    Reconciler::new(&config, &recorder, &PassThrough)
        .create(&ScheduleRequest::new("alpha"), &mut diagnostics)
        .unwrap();

    let warnings: Vec<_> = diagnostics.warnings().collect();
    assert_eq!(warnings, vec!["group 'nightly' references unknown profile 'ghost'"]);
}

#[test]
fn scheduler_comes_from_the_global_section() {
    let config = config(
        r#"
[global]
scheduler = "crontab:/etc/cron.d/rprofile"
[profiles.alpha.schedules.backup]
at = "daily"
"#,
    );
    let recorder = Recorder::default();

    Reconciler::new(&config, &recorder, &PassThrough)
        .create(&ScheduleRequest::new("alpha"), &mut Diagnostics::new())
        .unwrap();

    assert_eq!(
        recorder.schedulers.borrow().as_slice(),
        &[SchedulerConfig::Crontab {
            target: CrontabTarget::File {
                path: PathBuf::from("/etc/cron.d/rprofile"),
                user: None,
            }
        }]
    );
}

#[test]
fn remove_uses_recorded_jobs_with_profile_filter() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    let reconciler = Reconciler::new(&config, &recorder, &PassThrough);

    reconciler
        .remove(&ScheduleRequest::new("alpha"), &mut Diagnostics::new())
        .unwrap();
    reconciler.remove(&all(), &mut Diagnostics::new()).unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            Call::RemoveAll(PathBuf::from(CONFIG_FILE), "alpha".into()),
            Call::RemoveAll(PathBuf::from(CONFIG_FILE), String::new()),
        ]
    );
}

#[test]
fn remove_recorded_failure_is_fatal() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("", Failure::Handler);

    let err = Reconciler::new(&config, &recorder, &PassThrough)
        .remove(&all(), &mut Diagnostics::new())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Handler(_)));
}

#[test]
fn legacy_remove_continues_past_a_failing_profile() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("alpha", Failure::Handler);
    let mut diagnostics = Diagnostics::new();
    let request = ScheduleRequest {
        legacy: true,
        ..all()
    };

    Reconciler::new(&config, &recorder, &PassThrough)
        .remove(&request, &mut diagnostics)
        .unwrap();

    assert_eq!(recorder.targets(), vec!["alpha", "empty", "gamma"]);
    let errors: Vec<_> = diagnostics.errors().collect();
    assert_eq!(errors, vec!["profile 'alpha': scheduler error: boom"]);
    assert!(diagnostics.warnings().any(|w| w == LEGACY_FLAG_WARNING));
}

#[test]
fn legacy_remove_targets_undeclared_commands() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    let request = ScheduleRequest {
        legacy: true,
        ..ScheduleRequest::new("gamma")
    };

    Reconciler::new(&config, &recorder, &PassThrough)
        .remove(&request, &mut Diagnostics::new())
        .unwrap();

    let calls = recorder.calls();
    let [Call::Remove(jobs)] = calls.as_slice() else {
        panic!("unexpected calls {calls:?}");
    };
    let commands: Vec<_> = jobs.iter().map(|j| j.origin().command.as_str()).collect();
    assert_eq!(commands, vec!["prune", "backup", "check", "copy", "forget"]);
    assert!(jobs[0].is_declared());
    assert!(jobs[1..].iter().all(|j| !j.is_declared()));
}

#[test]
fn legacy_remove_aborts_on_resolution_failure() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    let request = ScheduleRequest {
        legacy: true,
        ..ScheduleRequest::new("ghost")
    };

    let err = Reconciler::new(&config, &recorder, &PassThrough)
        .remove(&request, &mut Diagnostics::new())
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(recorder.calls().is_empty());
}

#[test]
fn status_reports_recorded_jobs() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();

    Reconciler::new(&config, &recorder, &PassThrough)
        .status(&ScheduleRequest::new("gamma"), &mut Diagnostics::new())
        .unwrap();

    assert_eq!(
        recorder.calls(),
        vec![Call::ReportAll(PathBuf::from(CONFIG_FILE), "gamma".into())]
    );
}

#[test]
fn legacy_status_single_profile_stops_there() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    let reconciler = Reconciler::new(&config, &recorder, &PassThrough);
    let legacy = |name: &str| ScheduleRequest {
        legacy: true,
        ..ScheduleRequest::new(name)
    };

    reconciler
        .status(&legacy("alpha"), &mut Diagnostics::new())
        .unwrap();
    // nothing declared: warned about, not an error
    reconciler
        .status(&legacy("empty"), &mut Diagnostics::new())
        .unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], Call::Status(name, jobs) if name == "alpha" && jobs.len() == 2));
}

#[test]
fn legacy_status_all_logs_failures_then_reports_recorded() {
    let config = config(THREE_PROFILES);
    let recorder = Recorder::default();
    recorder.fail_for("alpha", Failure::Handler);
    let mut diagnostics = Diagnostics::new();
    let request = ScheduleRequest {
        legacy: true,
        ..all()
    };

    Reconciler::new(&config, &recorder, &PassThrough)
        .status(&request, &mut diagnostics)
        .unwrap();

    assert_eq!(recorder.targets(), vec!["alpha", "gamma", ""]);
    assert!(matches!(recorder.calls().last(), Some(Call::ReportAll(..))));
    assert_eq!(diagnostics.errors().count(), 1);
}

#[test]
fn legacy_status_all_can_skip_recorded_jobs() {
    let config = config(&format!(
        "[global]\nlegacy-then-current = false\n{THREE_PROFILES}"
    ));
    let recorder = Recorder::default();
    let request = ScheduleRequest {
        legacy: true,
        ..all()
    };

    Reconciler::new(&config, &recorder, &PassThrough)
        .status(&request, &mut Diagnostics::new())
        .unwrap();

    assert_eq!(recorder.targets(), vec!["alpha", "gamma"]);
}
