// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::sensor::DEFAULT_IGNORE_PATTERNS;
use crate::task::ContextParams;
use crate::types::WorkerArgs;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [settings]
/// base_dir = "/opt/fallax"
/// redis_url = "redis://localhost:6379"
///
/// [workflow.compress]
/// cmd = "gzip -c {input} > {output_dir}/{filename}.gz"
/// worker = { concurrency = 2 }
///
/// [[sensor]]
/// input_dir = "/data/incoming"
/// workflows = ["compress"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub settings: SettingsSection,

    /// All workflows from `[workflow.<name>]`, keyed by name.
    #[serde(default)]
    pub workflow: BTreeMap<String, WorkflowConfig>,

    /// All sensors from `[[sensor]]`, in file order.
    #[serde(default)]
    pub sensor: Vec<SensorConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: SettingsSection,
    pub workflow: BTreeMap<String, WorkflowSpec>,
    pub sensor: Vec<SensorConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        settings: SettingsSection,
        workflow: BTreeMap<String, WorkflowSpec>,
        sensor: Vec<SensorConfig>,
    ) -> Self {
        Self {
            settings,
            workflow,
            sensor,
        }
    }
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    /// Root of the `run/` and `log/` directories.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Base data directory of every task context. Defaults to
    /// `<base_dir>/data`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Redis logical database, appended to `redis_url` as `/<db>`.
    #[serde(default)]
    pub broker_db: u32,

    /// Name used for the supervisor socket, pid and log files.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// `-l` level passed to every supervised worker.
    #[serde(default = "default_worker_log_level")]
    pub worker_log_level: String,

    /// Run the broker under the supervisor as well.
    #[serde(default = "default_true")]
    pub supervise_broker: bool,

    #[serde(default = "default_broker_command")]
    pub broker_command: String,

    /// Optional periodic scheduler supervised next to the workers.
    #[serde(default)]
    pub beat_command: Option<String>,

    /// Glob patterns of files the sensors never touch.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/opt/fallax")
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_app_name() -> String {
    "fallax".to_string()
}

fn default_worker_log_level() -> String {
    "warning".to_string()
}

fn default_true() -> bool {
    true
}

fn default_broker_command() -> String {
    "redis-server --timeout 0".to_string()
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            data_dir: None,
            redis_url: default_redis_url(),
            broker_db: 0,
            app_name: default_app_name(),
            worker_log_level: default_worker_log_level(),
            supervise_broker: true,
            broker_command: default_broker_command(),
            beat_command: None,
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl SettingsSection {
    /// Broker connection URL: `redis_url` with the database appended.
    pub fn broker_url(&self) -> String {
        format!("{}/{}", self.redis_url.trim_end_matches('/'), self.broker_db)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.base_dir.join("run")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("log")
    }

    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => self.base_dir.join("data"),
        }
    }

    pub fn supervisor_config_path(&self) -> PathBuf {
        self.run_dir().join("supervisord.conf")
    }

    /// Create the run and log directories if missing.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [self.run_dir(), self.log_dir()] {
            if !dir.is_dir() {
                std::fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}

/// `[workflow.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Shell command template run for each dispatched file.
    pub cmd: String,

    /// Extra context parameters, also usable as `{placeholders}` in `cmd`.
    #[serde(default)]
    pub params: ContextParams,

    /// Worker launch overrides (`concurrency`, `autoscale`,
    /// `max-memory-per-child`).
    #[serde(default)]
    pub worker: BTreeMap<String, toml::Value>,
}

/// A workflow after validation: worker overrides normalized to strings.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSpec {
    pub cmd: String,
    pub params: ContextParams,
    pub worker: WorkerArgs,
}

/// `[[sensor]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SensorConfig {
    /// Directory to watch; created at startup if missing.
    pub input_dir: PathBuf,

    #[serde(default)]
    pub recursive: bool,

    /// Names of `[workflow.<name>]` sections fed by this sensor, in
    /// dispatch order.
    #[serde(default)]
    pub workflows: Vec<String>,
}

impl SensorConfig {
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }
}
