// tests/config_demos.rs
mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use scratchrun::artifact::{ConfigGenerator, Generator};
use scratchrun::config::load_and_validate;
use scratchrun_test_utils::builders::ConfigFileBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos")
}

/// demos/purchase-approval.toml is wired the way its header comment says.
#[test]
fn purchase_approval_demo_is_parsed_correctly() -> TestResult {
    init_tracing();

    let cfg = load_and_validate(demos_dir().join("purchase-approval.toml"))?;

    assert_eq!(cfg.runner.grace_period, Duration::from_secs(2));
    assert_eq!(cfg.runner.terminate_timeout, Duration::from_secs(5));
    assert_eq!(cfg.runner.workspace_prefix, "purchase_");
    assert_eq!(cfg.preflight.len(), 1);

    let backend = cfg.artifact.get("backend").expect("backend must exist");
    assert!(backend.executable);
    assert_eq!(backend.launcher.as_deref(), Some(&["sh".to_string()][..]));
    assert_eq!(backend.args, vec!["--port".to_string(), "8080".to_string()]);

    let frontend = cfg.artifact.get("frontend").expect("frontend must exist");
    assert!(!frontend.executable);
    assert_eq!(frontend.file, "static/index.html");

    Ok(())
}

/// Sources of the purchase demo resolve relative to the demos directory.
#[test]
fn purchase_approval_sources_are_readable() -> TestResult {
    init_tracing();

    let cfg = load_and_validate(demos_dir().join("purchase-approval.toml"))?;
    let artifacts = ConfigGenerator::new(cfg.artifact, demos_dir()).generate()?;

    assert_eq!(artifacts.len(), 2);
    assert!(artifacts[0].content.contains("trap"));
    assert!(artifacts[1].content.contains("<form"));
    Ok(())
}

#[test]
fn crashing_backend_demo_uses_inline_content() -> TestResult {
    init_tracing();

    let cfg = load_and_validate(demos_dir().join("crashing-backend.toml"))?;
    let backend = &cfg.artifact["backend"];

    assert!(backend.source.is_none());
    assert!(backend.content.as_deref().unwrap_or_default().contains("exit 3"));
    assert_eq!(cfg.runner.grace_period, Duration::from_secs(1));
    // Unset fields keep their defaults.
    assert_eq!(cfg.runner.terminate_timeout, Duration::from_secs(5));
    Ok(())
}

#[test]
fn static_only_demo_has_nothing_to_supervise() -> TestResult {
    init_tracing();

    let cfg = load_and_validate(demos_dir().join("static-only.toml"))?;
    assert_eq!(cfg.artifact.len(), 1);
    assert!(cfg.artifact.values().all(|a| !a.executable));
    assert!(cfg.preflight.is_empty());
    Ok(())
}

#[test]
fn every_demo_config_validates() -> TestResult {
    init_tracing();

    let mut seen = 0;
    for entry in std::fs::read_dir(demos_dir())? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        load_and_validate(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        seen += 1;
    }
    assert!(seen >= 3, "expected the demo configs, found {seen}");
    Ok(())
}

#[test]
fn builder_config_feeds_the_generator() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_grace_period("500ms")
        .with_preflight("sh -c true")
        .with_inline("frontend", "index.html", "<p>ok</p>")
        .build();
    assert_eq!(cfg.runner.grace_period, Duration::from_millis(500));
    assert_eq!(cfg.preflight[0].cmd, "sh -c true");

    let artifacts = ConfigGenerator::new(cfg.artifact, demos_dir()).generate()?;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].content, "<p>ok</p>");
    assert!(!artifacts[0].executable);
    Ok(())
}
