// tests/lifecycle_scenarios.rs
#![cfg(unix)]

mod common;
use crate::common::{fast_settings, init_tracing, leftover_workspaces, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use scratchrun::artifact::ArtifactWriter;
use scratchrun::engine::{DeployOutcome, LifecycleRun};
use scratchrun::errors::RunnerError;
use scratchrun::fs::mock::MockFileSystem;
use scratchrun::types::{RoleState, TerminateOutcome};
use scratchrun_test_utils::builders::ArtifactBuilder;
use scratchrun_test_utils::fake_signaller::{DeafSignaller, kill_process_group};
use scratchrun_test_utils::pid_alive;
use scratchrun_test_utils::recording_reporter::RecordingReporter;

#[tokio::test]
async fn backend_exiting_immediately_is_reported_and_workspace_removed() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));

    let root = run.begin().unwrap();
    assert!(root.is_dir());
    assert!(root.starts_with(scratch.path()));

    let outcome = run
        .deploy(&ArtifactBuilder::exits_with("backend", 1).build())
        .await
        .unwrap();
    assert!(
        matches!(outcome, DeployOutcome::FailedToStart { exit_code: Some(1), .. }),
        "got {outcome:?}"
    );
    let err = outcome.launch_error("backend").unwrap();
    assert_eq!(err.exit_code(), Some(1));

    let status = run.status();
    assert_eq!(status["backend"].state, RoleState::FailedToStart);
    assert_eq!(status["backend"].exit_code, Some(1));

    let report = with_timeout(run.end()).await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.workspace_removed.as_deref(), Some(root.as_path()));
    assert!(!root.exists());
}

#[tokio::test]
async fn backend_and_frontend_share_one_workspace() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let reporter = RecordingReporter::new();
    let mut run =
        LifecycleRun::new(fast_settings(scratch.path())).with_reporter(Arc::new(reporter.clone()));
    let root = run.begin().unwrap();

    let backend = run
        .deploy(&ArtifactBuilder::long_running("backend").build())
        .await
        .unwrap();
    let frontend = run
        .deploy(&ArtifactBuilder::page("frontend", "static/index.html", "<form></form>").build())
        .await
        .unwrap();

    assert!(matches!(backend, DeployOutcome::Running { pid: Some(_), .. }));
    assert_eq!(backend.path().parent(), Some(root.as_path()));
    assert_eq!(frontend, DeployOutcome::Written {
        path: root.join("static/index.html")
    });
    assert_eq!(
        std::fs::read_to_string(frontend.path()).unwrap(),
        "<form></form>"
    );

    let status = run.refresh_status();
    assert_eq!(status["backend"].state, RoleState::Running);
    assert_eq!(status["frontend"].state, RoleState::Written);
    assert_eq!(
        status["frontend"].url(),
        format!("file://{}", root.join("static/index.html").display())
    );
    assert_eq!(run.role_status("frontend").unwrap().state, RoleState::Written);
    assert!(matches!(
        run.role_status("worker"),
        Err(RunnerError::UnknownRole(ref r)) if r == "worker"
    ));
    assert_eq!(run.running_count(), 1);
    assert!(run.is_running("backend"));
    assert!(!run.is_running("frontend"));

    let report = with_timeout(run.end()).await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(matches!(
        report.stopped.as_slice(),
        [(role, TerminateOutcome::Graceful(_))] if role == "backend"
    ));
    assert!(!root.exists());

    assert_eq!(reporter.states_for("frontend"), vec![RoleState::Written]);
    assert_eq!(
        reporter.states_for("backend").last(),
        Some(&RoleState::Stopped)
    );
}

#[tokio::test]
async fn begin_failure_leaves_nothing_to_clean_up() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let not_a_dir = scratch.path().join("plain-file");
    std::fs::write(&not_a_dir, "x").unwrap();

    let mut run = LifecycleRun::new(fast_settings(&not_a_dir));
    let err = run.begin().unwrap_err();
    assert!(matches!(err, RunnerError::ResourceError(_)), "got {err:?}");
    assert!(run.workspace_path().is_none());

    let deploy = run
        .deploy(&ArtifactBuilder::long_running("backend").build())
        .await
        .unwrap_err();
    assert!(matches!(deploy, RunnerError::ResourceError(_)));

    let report = run.end().await;
    assert!(report.is_clean());
    assert!(report.stopped.is_empty());
    assert!(report.workspace_removed.is_none());
}

#[tokio::test]
async fn end_is_idempotent() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));
    run.begin().unwrap();
    run.deploy(&ArtifactBuilder::long_running("backend").build())
        .await
        .unwrap();

    let first = with_timeout(run.end()).await;
    assert!(!first.already_ended);
    assert_eq!(first.stopped.len(), 1);

    let second = run.end().await;
    assert!(second.already_ended);
    assert!(second.stopped.is_empty());
    assert!(second.is_clean());
    assert!(leftover_workspaces(scratch.path()).is_empty());
}

#[tokio::test]
async fn stubborn_process_is_killed_before_workspace_removal() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));
    let root = run.begin().unwrap();

    let outcome = run
        .deploy(&ArtifactBuilder::stubborn("backend").build())
        .await
        .unwrap();
    let DeployOutcome::Running { pid: Some(pid), .. } = outcome else {
        panic!("expected running, got {outcome:?}");
    };

    let report = with_timeout(run.end()).await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(
        report.stopped,
        vec![("backend".to_string(), TerminateOutcome::Killed)]
    );
    assert!(!pid_alive(pid));
    assert!(!root.exists());
}

#[tokio::test]
async fn deploy_after_end_is_a_resource_error() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));
    run.begin().unwrap();
    run.end().await;

    let err = run
        .deploy(&ArtifactBuilder::page("frontend", "index.html", "<p/>").build())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::ResourceError(_)));

    // A finished run never hands out a second workspace.
    assert!(run.begin().is_err());
    assert!(leftover_workspaces(scratch.path()).is_empty());
}

#[tokio::test]
async fn redeploying_a_running_role_is_refused_without_side_effects() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));
    run.begin().unwrap();

    let first = run
        .deploy(&ArtifactBuilder::long_running("backend").build())
        .await
        .unwrap();
    let original = std::fs::read_to_string(first.path()).unwrap();
    let pid_before = run.status()["backend"].pid;

    let replacement = ArtifactBuilder::script("backend", "echo replaced; exec sleep 30").build();
    let err = run.deploy(&replacement).await.unwrap_err();
    assert!(matches!(err, RunnerError::RoleBusy(ref r) if r == "backend"));

    assert_eq!(std::fs::read_to_string(first.path()).unwrap(), original);
    assert_eq!(run.status()["backend"].pid, pid_before);
    assert!(run.is_running("backend"));

    with_timeout(run.end()).await;
}

#[tokio::test]
async fn stopped_role_can_be_deployed_again() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));
    run.begin().unwrap();

    run.deploy(&ArtifactBuilder::exits_with("backend", 2).build())
        .await
        .unwrap();
    let again = run
        .deploy(&ArtifactBuilder::long_running("backend").build())
        .await
        .unwrap();
    assert!(matches!(again, DeployOutcome::Running { .. }));

    with_timeout(run.end()).await;
}

#[tokio::test]
async fn write_failure_only_affects_its_own_role() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let fs = MockFileSystem::new();
    fs.fail_writes(true);

    let mut run = LifecycleRun::new(fast_settings(scratch.path()))
        .with_writer(ArtifactWriter::new(Arc::new(fs.clone())));
    run.begin().unwrap();

    let err = run
        .deploy(&ArtifactBuilder::long_running("backend").build())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::IoError(ref m) if m.contains("No space left")));
    assert_eq!(run.running_count(), 0);
    assert!(!run.status().contains_key("backend"));

    fs.fail_writes(false);
    let page = run
        .deploy(&ArtifactBuilder::page("frontend", "index.html", "<p/>").build())
        .await
        .unwrap();
    assert!(matches!(page, DeployOutcome::Written { .. }));
    assert_eq!(fs.file_count(), 1);

    let report = run.end().await;
    assert!(report.is_clean());
}

#[tokio::test]
async fn traversal_filename_is_rejected_before_anything_runs() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));
    run.begin().unwrap();

    let escaping = ArtifactBuilder::long_running("backend")
        .filename("../escape.sh")
        .build();
    let err = run.deploy(&escaping).await.unwrap_err();

    assert!(matches!(err, RunnerError::IoError(_)));
    assert!(!scratch.path().join("escape.sh").exists());
    assert_eq!(run.running_count(), 0);

    run.end().await;
}

#[tokio::test]
async fn dropping_an_active_run_still_cleans_up() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();

    let (root, pid) = {
        let mut run = LifecycleRun::new(fast_settings(scratch.path()));
        let root = run.begin().unwrap();
        let outcome = run
            .deploy(&ArtifactBuilder::long_running("backend").build())
            .await
            .unwrap();
        let DeployOutcome::Running { pid: Some(pid), .. } = outcome else {
            panic!("expected running, got {outcome:?}");
        };
        (root, pid)
    };

    assert!(!root.exists());
    with_timeout(async {
        while pid_alive(pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
}

async fn read_pid_file(path: &std::path::Path) -> u32 {
    with_timeout(async {
        loop {
            if let Ok(s) = std::fs::read_to_string(path) {
                if let Ok(pid) = s.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
}

#[tokio::test]
async fn deploy_abandoned_during_grace_period_is_still_stopped_by_end() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut settings = fast_settings(scratch.path());
    settings.grace_period = Duration::from_secs(3);
    let mut run = LifecycleRun::new(settings);
    let root = run.begin().unwrap();

    let backend =
        ArtifactBuilder::script("backend", "sleep 30 &\necho $! > worker.pid\nwait").build();
    let abandoned = tokio::time::timeout(Duration::from_millis(300), run.deploy(&backend)).await;
    assert!(abandoned.is_err(), "deploy finished inside the grace period");

    let status = run.role_status("backend").unwrap();
    assert_eq!(status.state, RoleState::Starting);
    let leader = status.pid.expect("spawned process has a pid");
    let worker = read_pid_file(&root.join("worker.pid")).await;
    assert!(pid_alive(leader));

    // The abandoned launch still occupies the role.
    let again = run.deploy(&backend).await.unwrap_err();
    assert!(matches!(again, RunnerError::RoleBusy(ref r) if r == "backend"));

    let report = with_timeout(run.end()).await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(matches!(
        report.stopped.as_slice(),
        [(role, TerminateOutcome::Graceful(_) | TerminateOutcome::Killed)] if role == "backend"
    ));
    assert!(!root.exists());

    with_timeout(async {
        while pid_alive(leader) || pid_alive(worker) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn leftover_group_members_are_killed_by_end_after_failed_start() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()));
    let root = run.begin().unwrap();

    let backend =
        ArtifactBuilder::script("backend", "sleep 30 &\necho $! > worker.pid\nexit 1").build();
    let outcome = run.deploy(&backend).await.unwrap();
    assert!(
        matches!(outcome, DeployOutcome::FailedToStart { exit_code: Some(1), .. }),
        "got {outcome:?}"
    );
    let worker = read_pid_file(&root.join("worker.pid")).await;
    assert!(pid_alive(worker));

    let report = with_timeout(run.end()).await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(
        report.stopped,
        vec![("backend".to_string(), TerminateOutcome::AlreadyExited(Some(1)))]
    );
    assert!(!root.exists());

    with_timeout(async {
        while pid_alive(worker) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn undeliverable_signals_surface_as_termination_error() {
    init_tracing();
    let scratch = tempfile::tempdir().unwrap();
    let signaller = DeafSignaller::new();
    let mut run = LifecycleRun::new(fast_settings(scratch.path()))
        .with_signaller(Arc::new(signaller.clone()));
    let root = run.begin().unwrap();

    let outcome = run
        .deploy(&ArtifactBuilder::long_running("backend").build())
        .await
        .unwrap();
    let DeployOutcome::Running { pid: Some(pid), .. } = outcome else {
        panic!("expected running, got {outcome:?}");
    };

    let report = with_timeout(run.end()).await;
    assert!(!report.is_clean());
    assert!(
        report.errors.iter().any(
            |e| matches!(e, RunnerError::TerminationError { role, .. } if role == "backend")
        ),
        "{:?}",
        report.errors
    );
    assert!(matches!(
        report.stopped.as_slice(),
        [(role, TerminateOutcome::Unkillable(_))] if role == "backend"
    ));
    // Workspace removal still runs after a failed stop.
    assert!(!root.exists());
    assert_eq!(
        signaller.sent(),
        vec![
            format!("term {pid}"),
            format!("kill {pid}"),
            format!("kill-child {pid}"),
        ]
    );
    assert!(pid_alive(pid));

    kill_process_group(pid);
    with_timeout(async {
        while pid_alive(pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
}
