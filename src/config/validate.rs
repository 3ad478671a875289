// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{
    ConfigFile, RawConfigFile, SensorConfig, SettingsSection, WorkflowConfig, WorkflowSpec,
};
use crate::errors::{FallaxError, Result};
use crate::sensor::IgnorePatterns;
use crate::types::{
    is_plain_name, parse_autoscale, WorkerArgs, DEFAULT_QUEUE, KEY_AUTOSCALE, KEY_CONCURRENCY,
    KEY_MAX_MEMORY_PER_CHILD,
};

const WORKER_LOG_LEVELS: &[&str] = &["debug", "info", "warning", "warn", "error", "critical"];

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FallaxError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_settings(&raw.settings)?;

        let mut workflows = BTreeMap::new();
        for (name, wf) in raw.workflow {
            let spec = validate_workflow(&name, wf)?;
            workflows.insert(name, spec);
        }

        validate_sensors(&raw.sensor, &workflows)?;

        Ok(ConfigFile::new_unchecked(raw.settings, workflows, raw.sensor))
    }
}

fn config_error(msg: impl Into<String>) -> FallaxError {
    FallaxError::ConfigError(msg.into())
}

fn validate_settings(settings: &SettingsSection) -> Result<()> {
    if settings.redis_url.trim().is_empty() {
        return Err(config_error("[settings].redis_url must not be empty"));
    }
    if settings.app_name.trim().is_empty() {
        return Err(config_error("[settings].app_name must not be empty"));
    }
    let level = settings.worker_log_level.to_ascii_lowercase();
    if !WORKER_LOG_LEVELS.contains(&level.as_str()) {
        return Err(config_error(format!(
            "[settings].worker_log_level '{}' is not one of {:?}",
            settings.worker_log_level, WORKER_LOG_LEVELS
        )));
    }
    if settings.supervise_broker && settings.broker_command.trim().is_empty() {
        return Err(config_error(
            "[settings].broker_command must not be empty when supervise_broker = true",
        ));
    }
    IgnorePatterns::new(settings.ignore_patterns.as_slice())
        .map_err(|e| config_error(format!("[settings].ignore_patterns: {e:#}")))?;
    Ok(())
}

fn validate_workflow(name: &str, wf: WorkflowConfig) -> Result<WorkflowSpec> {
    if name.trim().is_empty() {
        return Err(config_error("workflow name must not be empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(config_error(format!(
            "workflow name '{name}' must be a single path component"
        )));
    }
    if !is_plain_name(name) {
        return Err(config_error(format!(
            "workflow name '{name}' may only contain letters, digits, '_', '.' and '-'"
        )));
    }
    if name == DEFAULT_QUEUE {
        return Err(config_error(format!(
            "workflow name '{name}' is reserved for the default queue"
        )));
    }
    if wf.cmd.trim().is_empty() {
        return Err(config_error(format!("workflow '{name}' has an empty `cmd`")));
    }

    let worker = worker_overrides(name, &wf.worker)?;

    Ok(WorkflowSpec {
        cmd: wf.cmd,
        params: wf.params,
        worker,
    })
}

/// Normalize `[workflow.<name>].worker` into launch arguments.
///
/// Keys may use `_` or `-`; values may be TOML strings or integers.
fn worker_overrides(
    workflow: &str,
    raw: &BTreeMap<String, toml::Value>,
) -> Result<WorkerArgs> {
    let mut args = WorkerArgs::new();

    for (key, value) in raw {
        let key = key.replace('_', "-");
        let text = match value {
            toml::Value::String(s) => s.trim().to_string(),
            toml::Value::Integer(i) => i.to_string(),
            other => {
                return Err(config_error(format!(
                    "workflow '{workflow}': worker option '{key}' must be a string or integer, got {}",
                    other.type_str()
                )));
            }
        };

        match key.as_str() {
            KEY_CONCURRENCY | KEY_MAX_MEMORY_PER_CHILD => match text.parse::<u64>() {
                Ok(n) if n > 0 => {}
                _ => {
                    return Err(config_error(format!(
                        "workflow '{workflow}': worker option '{key}' must be a positive integer (got '{text}')"
                    )));
                }
            },
            KEY_AUTOSCALE => {
                parse_autoscale(&text)
                    .map_err(|e| config_error(format!("workflow '{workflow}': {e}")))?;
            }
            _ => {
                return Err(config_error(format!(
                    "workflow '{workflow}': unknown worker option '{key}' (expected one of {KEY_CONCURRENCY}, {KEY_AUTOSCALE}, {KEY_MAX_MEMORY_PER_CHILD})"
                )));
            }
        }

        args.insert(key, text);
    }

    Ok(args)
}

fn validate_sensors(
    sensors: &[SensorConfig],
    workflows: &BTreeMap<String, WorkflowSpec>,
) -> Result<()> {
    for (idx, sensor) in sensors.iter().enumerate() {
        if sensor.input_dir.as_os_str().is_empty() {
            return Err(config_error(format!(
                "[[sensor]] #{} has an empty input_dir",
                idx + 1
            )));
        }
        for wf in &sensor.workflows {
            if !workflows.contains_key(wf) {
                return Err(config_error(format!(
                    "sensor on {} refers to unknown workflow '{wf}'",
                    sensor.input_dir.display()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_and_validate;

    fn err_msg(toml: &str) -> String {
        match parse_and_validate(toml) {
            Err(FallaxError::ConfigError(msg)) => msg,
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = parse_and_validate("").unwrap();
        assert_eq!(cfg.settings.broker_url(), "redis://localhost:6379/0");
        assert_eq!(cfg.settings.ignore_patterns, vec!["*.tmp".to_string()]);
        assert!(cfg.workflow.is_empty());
        assert!(cfg.sensor.is_empty());
    }

    #[test]
    fn worker_overrides_accept_strings_integers_and_underscores() {
        let cfg = parse_and_validate(
            r#"
            [workflow.zip]
            cmd = "gzip {input}"
            worker = { concurrency = 2, max_memory_per_child = "2048", autoscale = "4,1" }
            "#,
        )
        .unwrap();

        let worker = &cfg.workflow["zip"].worker;
        assert_eq!(worker.get(KEY_CONCURRENCY), Some("2"));
        assert_eq!(worker.get(KEY_MAX_MEMORY_PER_CHILD), Some("2048"));
        assert_eq!(worker.get(KEY_AUTOSCALE), Some("4,1"));
    }

    #[test]
    fn rejects_bad_worker_options() {
        let unknown = err_msg("[workflow.a]\ncmd = \"x\"\nworker = { prefetch = 4 }\n");
        assert!(unknown.contains("unknown worker option"), "{unknown}");

        let zero = err_msg("[workflow.a]\ncmd = \"x\"\nworker = { concurrency = 0 }\n");
        assert!(zero.contains("positive integer"), "{zero}");

        let scale = err_msg("[workflow.a]\ncmd = \"x\"\nworker = { autoscale = \"1,4\" }\n");
        assert!(scale.contains("lower than minimum"), "{scale}");
    }

    #[test]
    fn rejects_reserved_and_path_like_workflow_names() {
        assert!(err_msg("[workflow.default]\ncmd = \"x\"\n").contains("reserved"));
        assert!(err_msg("[workflow.\"a/b\"]\ncmd = \"x\"\n").contains("single path component"));
        assert!(err_msg("[workflow.a]\ncmd = \"  \"\n").contains("empty `cmd`"));
    }

    #[test]
    fn rejects_workflow_names_with_separators() {
        for name in ["a,b", "a b", "a;b"] {
            let msg = err_msg(&format!("[workflow.\"{name}\"]\ncmd = \"x\"\n"));
            assert!(msg.contains("may only contain"), "{name}: {msg}");
        }
    }

    #[test]
    fn sensors_must_reference_known_workflows() {
        let msg = err_msg(
            r#"
            [workflow.a]
            cmd = "true"

            [[sensor]]
            input_dir = "/in"
            workflows = ["a", "b"]
            "#,
        );
        assert!(msg.contains("unknown workflow 'b'"), "{msg}");
    }

    #[test]
    fn rejects_invalid_ignore_globs_and_log_levels() {
        assert!(err_msg("[settings]\nignore_patterns = [\"a[\"]\n").contains("ignore_patterns"));
        assert!(err_msg("[settings]\nworker_log_level = \"loud\"\n").contains("worker_log_level"));
    }
}
