// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;
pub mod workspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ConfigGenerator, Generator, StaticGenerator};
use crate::cli::CliArgs;
use crate::config::{ConfigFile, PreflightCheck, RunnerSettings, load_and_validate};
use crate::engine::{ConsoleReporter, DeployOutcome, LifecycleRun, RoleStatus, TeardownReport};
use crate::errors::RunnerError;
use crate::exec::run_preflight;
use crate::types::{Role, RoleState};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (or the canned demo generator)
/// - preflight checks
/// - workspace + deployment of every artifact
/// - liveness polling until Ctrl-C or until nothing is left running
/// - teardown and the per-role summary
///
/// Returns `true` when every role deployed cleanly and teardown reported no
/// errors.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);

    let cfg = if args.demo && !config_path.exists() {
        debug!(config = %config_path.display(), "no config file; demo uses default settings");
        None
    } else {
        Some(
            load_and_validate(&config_path)
                .with_context(|| format!("loading config {:?}", config_path))?,
        )
    };

    let settings = cfg
        .as_ref()
        .map(|c| c.runner.clone())
        .unwrap_or_default();
    let preflight = cfg
        .as_ref()
        .map(|c| c.preflight.clone())
        .unwrap_or_default();

    let generator: Box<dyn Generator> = match (&cfg, args.demo) {
        (_, true) => Box::new(StaticGenerator),
        (Some(cfg), false) => Box::new(ConfigGenerator::new(
            cfg.artifact.clone(),
            config_root_dir(&config_path),
        )),
        (None, false) => anyhow::bail!("no artifacts configured in {:?}", config_path),
    };

    if args.dry_run {
        print_dry_run(&settings, &preflight, cfg.as_ref(), args.demo);
        return Ok(true);
    }

    let artifacts = generator.generate().context("generating artifacts")?;

    for report in run_preflight(&preflight, settings.terminate_timeout).await? {
        println!(
            "preflight ok: {}{}",
            report.cmd,
            report
                .summary
                .map(|s| format!(" ({s})"))
                .unwrap_or_default()
        );
    }

    let mut lifecycle = LifecycleRun::new(settings.clone()).with_reporter(Arc::new(ConsoleReporter));
    let workspace = lifecycle.begin().context("allocating workspace")?;
    println!("workspace: {}", workspace.display());

    let mut deploys: Vec<(Role, std::result::Result<DeployOutcome, RunnerError>)> = Vec::new();

    let interrupted = tokio::select! {
        _ = drive(&mut lifecycle, &artifacts, &mut deploys, args.once, settings.poll_interval) => false,
        _ = wait_for_ctrl_c() => true,
    };
    if interrupted {
        println!("interrupted; shutting down");
    }

    let status = lifecycle.status();
    let teardown = lifecycle.end().await;

    print_summary(&artifacts, &deploys, &status, &teardown);

    let deploys_ok = artifacts.iter().all(|a| {
        deploys.iter().any(|(role, res)| {
            role == &a.role
                && matches!(
                    res,
                    Ok(DeployOutcome::Running { .. } | DeployOutcome::Written { .. })
                )
        })
    });

    Ok(deploys_ok && teardown.is_clean())
}

/// Deploy everything, then watch until there is nothing left to watch.
async fn drive(
    lifecycle: &mut LifecycleRun,
    artifacts: &[Artifact],
    deploys: &mut Vec<(Role, std::result::Result<DeployOutcome, RunnerError>)>,
    once: bool,
    poll_interval: Duration,
) {
    for artifact in artifacts {
        let result = lifecycle.deploy(artifact).await;
        if let Err(e) = &result {
            warn!(role = %artifact.role, error = %e, "deploy failed");
        }
        deploys.push((artifact.role.clone(), result));
    }

    if once {
        return;
    }

    let supervised = artifacts.iter().any(|a| a.executable);
    if supervised && lifecycle.running_count() == 0 {
        info!("no supervised process survived deployment");
        return;
    }

    println!("running; press Ctrl+C to stop");
    loop {
        tokio::time::sleep(poll_interval).await;
        if supervised && lifecycle.running_count() == 0 {
            info!("all supervised processes have exited");
            return;
        }
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Directory that relative `source` paths are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "demos/app.toml"),
///   we use that directory.
/// - If it's just a bare filename, we fall back to the current directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn print_dry_run(
    settings: &RunnerSettings,
    preflight: &[PreflightCheck],
    cfg: Option<&ConfigFile>,
    demo: bool,
) {
    println!("scratchrun dry-run");
    println!("  runner.grace_period = {:?}", settings.grace_period);
    println!("  runner.terminate_timeout = {:?}", settings.terminate_timeout);
    println!("  runner.poll_interval = {:?}", settings.poll_interval);
    println!(
        "  workspace = {}/{}*",
        settings.scratch_root().display(),
        settings.workspace_prefix
    );
    println!();

    if !preflight.is_empty() {
        println!("preflight ({}):", preflight.len());
        for check in preflight {
            println!("  - {}", check.cmd);
        }
    }

    if demo {
        println!("artifacts: built-in demo set");
        return;
    }

    let Some(cfg) = cfg else {
        return;
    };
    println!("artifacts ({}):", cfg.artifact.len());
    for (role, artifact) in cfg.artifact.iter() {
        println!("  - {role}");
        println!("      file: {}", artifact.file);
        if let Some(source) = &artifact.source {
            println!("      source: {}", source.display());
        } else {
            println!("      content: inline");
        }
        if artifact.executable {
            println!("      executable: true");
        }
        if let Some(launcher) = &artifact.launcher {
            println!("      launcher: {:?}", launcher);
        }
        if !artifact.args.is_empty() {
            println!("      args: {:?}", artifact.args);
        }
    }

    debug!("dry-run complete (nothing written or launched)");
}

fn print_summary(
    artifacts: &[Artifact],
    deploys: &[(Role, std::result::Result<DeployOutcome, RunnerError>)],
    status: &std::collections::BTreeMap<Role, RoleStatus>,
    teardown: &TeardownReport,
) {
    println!();
    println!("{:<12} {:<16} {:<6} location", "role", "state", "exit");

    for artifact in artifacts {
        let role = &artifact.role;
        let deploy = deploys.iter().find(|(r, _)| r == role).map(|(_, res)| res);

        let (state, exit, location) = match (deploy, status.get(role)) {
            (Some(Err(e)), _) => ("not deployed".to_string(), "-".to_string(), e.to_string()),
            (None, _) => ("not deployed".to_string(), "-".to_string(), String::new()),
            (Some(Ok(outcome)), Some(st)) => {
                let shown = match (outcome.state(), st.state) {
                    (RoleState::FailedToStart, _) => RoleState::FailedToStart,
                    (_, current) => current,
                };
                let exit = st
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let location = if shown == RoleState::Written {
                    st.url()
                } else {
                    st.path.display().to_string()
                };
                (shown.to_string(), exit, location)
            }
            (Some(Ok(outcome)), None) => (
                outcome.state().to_string(),
                "-".to_string(),
                outcome.path().display().to_string(),
            ),
        };

        println!("{:<12} {:<16} {:<6} {}", role, state, exit, location);
    }

    for (role, outcome) in &teardown.stopped {
        debug!(role = %role, ?outcome, "teardown outcome");
    }
    for err in &teardown.errors {
        println!("teardown: {err}");
    }
    if let Some(path) = &teardown.workspace_removed {
        println!("workspace removed: {}", path.display());
    }
}
