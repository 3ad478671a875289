// src/deployment.rs

//! The set of task factories and sensors one `fallax` installation runs.
//!
//! The shipped binary builds a [`Deployment`] from the TOML config, binding
//! each `[workflow.<name>]` to the built-in shell-command task. Library users
//! can assemble one by hand with their own task functions and drive the CLI
//! through [`crate::run_with`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::{ConfigFile, SensorConfig};
use crate::errors::{FallaxError, Result};
use crate::sensor::{EventsToWorkflows, FilesystemSensor, IgnorePatterns};
use crate::supervisor::QueueProgram;
use crate::task::{QueueApp, TaskContext, TaskFactory, Workflow};
use crate::types::{WorkerArgs, DEFAULT_QUEUE};
use crate::worker::command::command_task;

/// A watched directory and the workflows (by name) it feeds, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSpec {
    pub input_dir: PathBuf,
    pub recursive: bool,
    pub workflows: Vec<String>,
}

impl SensorSpec {
    pub fn new(input_dir: impl Into<PathBuf>, workflows: Vec<String>) -> Self {
        Self {
            input_dir: input_dir.into(),
            recursive: false,
            workflows,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

impl From<&SensorConfig> for SensorSpec {
    fn from(cfg: &SensorConfig) -> Self {
        SensorSpec::new(cfg.input_dir.clone(), cfg.workflows.clone()).recursive(cfg.recursive)
    }
}

#[derive(Debug)]
pub struct Deployment {
    app: Arc<QueueApp>,
    factories: Vec<TaskFactory>,
    sensors: Vec<SensorSpec>,
    ignore: IgnorePatterns,
}

impl Deployment {
    pub fn new(app: Arc<QueueApp>) -> Self {
        Self {
            app,
            factories: Vec::new(),
            sensors: Vec::new(),
            ignore: IgnorePatterns::default(),
        }
    }

    /// One command-task factory per workflow and one sensor per `[[sensor]]`.
    ///
    /// Contexts are created under the configured data dir, so their working
    /// directories exist once this returns.
    pub fn from_config(cfg: &ConfigFile, app: Arc<QueueApp>) -> Result<Self> {
        let data_dir = cfg.settings.data_dir();
        let ignore = IgnorePatterns::new(cfg.settings.ignore_patterns.as_slice())
            .map_err(|e| FallaxError::ConfigError(format!("{e:#}")))?;

        let mut deployment = Self::new(app).with_ignore_patterns(ignore);

        for (name, wf) in &cfg.workflow {
            let ctx = TaskContext::new(name.as_str(), &data_dir, wf.params.clone())?;
            let factory = TaskFactory::new(
                Arc::clone(&deployment.app),
                ctx,
                command_task(wf.cmd.as_str()),
                Some(wf.worker.clone()),
            );
            deployment.add_factory(factory)?;
        }

        for sensor in &cfg.sensor {
            deployment.add_sensor(SensorSpec::from(sensor));
        }

        Ok(deployment)
    }

    pub fn with_ignore_patterns(mut self, ignore: IgnorePatterns) -> Self {
        self.ignore = ignore;
        self
    }

    /// Add a factory, registering its task with the app.
    pub fn add_factory(&mut self, factory: TaskFactory) -> Result<&mut Self> {
        factory.task()?;
        debug!(workflow = %factory.queue_name(), "factory added");
        self.factories.push(factory);
        Ok(self)
    }

    pub fn add_sensor(&mut self, sensor: SensorSpec) -> &mut Self {
        self.sensors.push(sensor);
        self
    }

    pub fn factories(&self) -> &[TaskFactory] {
        &self.factories
    }

    pub fn sensors(&self) -> &[SensorSpec] {
        &self.sensors
    }

    pub fn factory(&self, name: &str) -> Option<&TaskFactory> {
        self.factories.iter().find(|f| f.queue_name() == name)
    }

    /// Every queue that needs a worker: the default queue first, then one per
    /// factory with its merged launch arguments.
    pub fn queues(&self) -> Vec<QueueProgram> {
        std::iter::once(QueueProgram::new(DEFAULT_QUEUE, WorkerArgs::defaults()))
            .chain(
                self.factories
                    .iter()
                    .map(|f| QueueProgram::new(f.queue_name(), f.worker_launch_args())),
            )
            .collect()
    }

    fn workflows_for(&self, spec: &SensorSpec) -> Result<Vec<Workflow>> {
        spec.workflows
            .iter()
            .map(|name| {
                self.factory(name)
                    .ok_or_else(|| FallaxError::UnknownTask(name.clone()))?
                    .workflow()
            })
            .collect()
    }

    /// Build the sensors, creating their input directories.
    pub fn build_sensors(&self) -> Result<Vec<FilesystemSensor>> {
        self.sensors
            .iter()
            .map(|spec| {
                let handler = EventsToWorkflows::new(&spec.input_dir, self.workflows_for(spec)?)
                    .with_ignore_patterns(self.ignore.clone());
                Ok(FilesystemSensor::from_handler(handler)?.with_recursive(spec.recursive))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::config::parse_and_validate;
    use crate::queue::MemoryBroker;
    use crate::types::KEY_CONCURRENCY;

    fn config(base: &std::path::Path) -> ConfigFile {
        parse_and_validate(&format!(
            r#"
            [settings]
            base_dir = "{base}"

            [workflow.zip]
            cmd = "gzip -c {{input}} > {{output_dir}}/{{filename}}.gz"
            worker = {{ concurrency = 2 }}

            [workflow.archive]
            cmd = "cp {{input}} /archive"

            [[sensor]]
            input_dir = "{base}/incoming"
            workflows = ["zip", "archive"]
            "#,
            base = base.display()
        ))
        .unwrap()
    }

    #[test]
    fn from_config_registers_one_task_per_workflow() {
        let dir = tempdir().unwrap();
        let app = QueueApp::new("test", Arc::new(MemoryBroker::new()));

        let d = Deployment::from_config(&config(dir.path()), app.clone()).unwrap();

        assert_eq!(
            app.registered(),
            vec![
                ("archive".to_string(), "archive".to_string()),
                ("zip".to_string(), "zip".to_string()),
            ]
        );
        assert!(dir.path().join("data/working/zip/in").is_dir());
        assert_eq!(d.sensors().len(), 1);
    }

    #[test]
    fn queues_start_with_the_default_queue() {
        let dir = tempdir().unwrap();
        let app = QueueApp::new("test", Arc::new(MemoryBroker::new()));
        let d = Deployment::from_config(&config(dir.path()), app).unwrap();

        let queues = d.queues();

        let names: Vec<_> = queues.iter().map(|q| q.queue.as_str()).collect();
        assert_eq!(names, vec!["default", "archive", "zip"]);
        assert_eq!(queues[0].args, WorkerArgs::defaults());
        assert_eq!(queues[2].args.get(KEY_CONCURRENCY), Some("2"));
    }

    #[test]
    fn build_sensors_keeps_workflow_order_and_creates_input_dir() {
        let dir = tempdir().unwrap();
        let app = QueueApp::new("test", Arc::new(MemoryBroker::new()));
        let d = Deployment::from_config(&config(dir.path()), app).unwrap();

        let sensors = d.build_sensors().unwrap();

        assert_eq!(sensors.len(), 1);
        let names: Vec<_> = sensors[0].handler().workflows().iter().map(Workflow::name).collect();
        assert_eq!(names, vec!["zip", "archive"]);
        assert!(dir.path().join("incoming").is_dir());
    }

    #[test]
    fn sensor_with_unknown_workflow_fails_to_build() {
        let app = QueueApp::new("test", Arc::new(MemoryBroker::new()));
        let mut d = Deployment::new(app);
        d.add_sensor(SensorSpec::new("/nonexistent/in", vec!["ghost".into()]));

        let err = d.build_sensors().unwrap_err();

        assert!(matches!(err, FallaxError::UnknownTask(ref n) if n == "ghost"));
    }
}
