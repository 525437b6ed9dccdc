// src/config/validate.rs

use std::collections::HashMap;

use crate::artifact::check_relative_filename;
use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, RawRunnerSection, RunnerSettings};
use crate::errors::{Result, RunnerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RunnerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_artifacts(&raw)?;
        let runner = validate_runner(&raw.runner)?;
        validate_artifacts(&raw)?;
        validate_preflight(&raw)?;
        Ok(ConfigFile::new_unchecked(runner, raw.preflight, raw.artifact))
    }
}

fn ensure_has_artifacts(cfg: &RawConfigFile) -> Result<()> {
    if cfg.artifact.is_empty() {
        return Err(RunnerError::ConfigError(
            "config must contain at least one [artifact.<role>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_runner(raw: &RawRunnerSection) -> Result<RunnerSettings> {
    let duration = |field: &str, value: &str| {
        parse_duration(value)
            .map_err(|e| RunnerError::ConfigError(format!("[runner].{field}: {e}")))
    };

    let settings = RunnerSettings {
        grace_period: duration("grace_period", &raw.grace_period)?,
        terminate_timeout: duration("terminate_timeout", &raw.terminate_timeout)?,
        poll_interval: duration("poll_interval", &raw.poll_interval)?,
        workspace_prefix: raw.workspace_prefix.clone(),
        scratch_dir: raw.scratch_dir.clone(),
    };

    if settings.terminate_timeout.is_zero() {
        return Err(RunnerError::ConfigError(
            "[runner].terminate_timeout must be greater than zero".to_string(),
        ));
    }
    if settings.poll_interval.is_zero() {
        return Err(RunnerError::ConfigError(
            "[runner].poll_interval must be greater than zero".to_string(),
        ));
    }
    if settings.workspace_prefix.contains(['/', '\\']) {
        return Err(RunnerError::ConfigError(format!(
            "[runner].workspace_prefix {:?} must not contain path separators",
            settings.workspace_prefix
        )));
    }

    Ok(settings)
}

fn validate_artifacts(cfg: &RawConfigFile) -> Result<()> {
    let mut targets: HashMap<std::path::PathBuf, &str> = HashMap::new();

    for (role, artifact) in cfg.artifact.iter() {
        let target = check_relative_filename(&artifact.file).map_err(|e| {
            RunnerError::ConfigError(format!("artifact '{role}' has an unusable `file`: {e}"))
        })?;

        if let Some(other) = targets.insert(target, role) {
            return Err(RunnerError::ConfigError(format!(
                "artifacts '{other}' and '{role}' both write to '{}'",
                artifact.file
            )));
        }

        match (&artifact.source, &artifact.content) {
            (Some(_), Some(_)) => {
                return Err(RunnerError::ConfigError(format!(
                    "artifact '{role}' sets both `source` and `content`; pick one"
                )));
            }
            (None, None) => {
                return Err(RunnerError::ConfigError(format!(
                    "artifact '{role}' needs either `source` or `content`"
                )));
            }
            _ => {}
        }

        if let Some(launcher) = &artifact.launcher {
            if launcher.is_empty() || launcher[0].trim().is_empty() {
                return Err(RunnerError::ConfigError(format!(
                    "artifact '{role}' has an empty `launcher`"
                )));
            }
        }

        if !artifact.executable && (artifact.launcher.is_some() || !artifact.args.is_empty()) {
            return Err(RunnerError::ConfigError(format!(
                "artifact '{role}' sets `launcher`/`args` but is not `executable`"
            )));
        }
    }
    Ok(())
}

fn validate_preflight(cfg: &RawConfigFile) -> Result<()> {
    for (idx, check) in cfg.preflight.iter().enumerate() {
        if check.cmd.trim().is_empty() {
            return Err(RunnerError::ConfigError(format!(
                "[[preflight]] entry #{} has an empty `cmd`",
                idx + 1
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::parse_and_validate;
    use crate::errors::RunnerError;

    fn config_error(toml: &str) -> String {
        match parse_and_validate(toml) {
            Err(RunnerError::ConfigError(msg)) => msg,
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_and_validate(
            r#"
[artifact.frontend]
file = "index.html"
content = "<html></html>"
"#,
        )
        .unwrap();

        assert_eq!(cfg.runner.grace_period, Duration::from_secs(3));
        assert_eq!(cfg.runner.terminate_timeout, Duration::from_secs(5));
        assert_eq!(cfg.runner.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.runner.workspace_prefix, "scratchrun_");
        assert!(cfg.preflight.is_empty());
        assert!(!cfg.artifact["frontend"].executable);
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(config_error("").contains("at least one [artifact.<role>]"));
    }

    #[test]
    fn traversal_in_file_is_rejected() {
        let msg = config_error(
            r#"
[artifact.backend]
file = "../outside.sh"
content = "echo hi"
executable = true
"#,
        );
        assert!(msg.contains("backend"), "{msg}");
    }

    #[test]
    fn source_and_content_are_mutually_exclusive() {
        let msg = config_error(
            r#"
[artifact.backend]
file = "main.py"
source = "gen/main.py"
content = "print(1)"
"#,
        );
        assert!(msg.contains("both `source` and `content`"));

        let msg = config_error(
            r#"
[artifact.backend]
file = "main.py"
"#,
        );
        assert!(msg.contains("either `source` or `content`"));
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let msg = config_error(
            r#"
[artifact.a]
file = "index.html"
content = "a"

[artifact.b]
file = "./index.html"
content = "b"
"#,
        );
        assert!(msg.contains("both write to"));
    }

    #[test]
    fn launcher_requires_executable_and_must_not_be_empty() {
        let msg = config_error(
            r#"
[artifact.frontend]
file = "index.html"
content = "x"
launcher = ["python3"]
"#,
        );
        assert!(msg.contains("not `executable`"));

        let msg = config_error(
            r#"
[artifact.backend]
file = "main.py"
content = "x"
executable = true
launcher = []
"#,
        );
        assert!(msg.contains("empty `launcher`"));
    }

    #[test]
    fn bad_durations_are_rejected() {
        let msg = config_error(
            r#"
[runner]
grace_period = "soon"

[artifact.a]
file = "a.txt"
content = "a"
"#,
        );
        assert!(msg.contains("grace_period"));

        let msg = config_error(
            r#"
[runner]
terminate_timeout = "0s"

[artifact.a]
file = "a.txt"
content = "a"
"#,
        );
        assert!(msg.contains("terminate_timeout"));
    }

    #[test]
    fn toml_syntax_errors_keep_their_own_variant() {
        let err = parse_and_validate("[artifact.a\nfile = 1").unwrap_err();
        assert!(matches!(err, RunnerError::TomlError(_)), "got {err:?}");
    }
}
