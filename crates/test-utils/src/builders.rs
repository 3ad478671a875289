#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use fallax::config::{
    ConfigFile, RawConfigFile, SensorConfig, SettingsSection, WorkflowConfig,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    /// Config rooted at `base_dir` (run/, log/ and data/ live below it).
    pub fn new(base_dir: &Path) -> Self {
        Self {
            config: RawConfigFile {
                settings: SettingsSection {
                    base_dir: base_dir.to_path_buf(),
                    ..SettingsSection::default()
                },
                workflow: BTreeMap::new(),
                sensor: Vec::new(),
            },
        }
    }

    pub fn with_workflow(mut self, name: &str, workflow: WorkflowConfig) -> Self {
        self.config.workflow.insert(name.to_string(), workflow);
        self
    }

    pub fn with_sensor(mut self, input_dir: &Path, workflows: &[&str]) -> Self {
        self.config.sensor.push(SensorConfig {
            input_dir: input_dir.to_path_buf(),
            recursive: false,
            workflows: workflows.iter().map(|w| w.to_string()).collect(),
        });
        self
    }

    pub fn with_ignore_pattern(mut self, pattern: &str) -> Self {
        self.config.settings.ignore_patterns.push(pattern.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `WorkflowConfig`.
pub struct WorkflowConfigBuilder {
    workflow: WorkflowConfig,
}

impl WorkflowConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            workflow: WorkflowConfig {
                cmd: cmd.to_string(),
                params: BTreeMap::new(),
                worker: BTreeMap::new(),
            },
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.workflow.params.insert(key.to_string(), value.into());
        self
    }

    pub fn worker_arg(mut self, key: &str, value: i64) -> Self {
        self.workflow
            .worker
            .insert(key.to_string(), toml::Value::Integer(value));
        self
    }

    pub fn build(self) -> WorkflowConfig {
        self.workflow
    }
}
