// src/supervisor/config.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::SettingsSection;
use crate::types::WorkerArgs;

/// One queue and the launch arguments of its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueProgram {
    pub queue: String,
    pub args: WorkerArgs,
}

impl QueueProgram {
    pub fn new(queue: impl Into<String>, args: WorkerArgs) -> Self {
        Self {
            queue: queue.into(),
            args,
        }
    }
}

/// Everything needed to render the supervisord configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub app_name: String,
    pub run_dir: PathBuf,
    pub log_dir: PathBuf,
    /// The `fallax` executable the sensors and workers are started with.
    pub exe: PathBuf,
    /// The deployment config file passed to every child with `-s`.
    pub config_file: PathBuf,
    pub worker_log_level: String,
    /// Broker program command, when the broker is supervised too.
    pub broker_command: Option<String>,
    pub beat_command: Option<String>,
    pub queues: Vec<QueueProgram>,
}

impl SupervisorConfig {
    pub fn from_settings(
        settings: &SettingsSection,
        exe: impl Into<PathBuf>,
        config_file: impl Into<PathBuf>,
        queues: Vec<QueueProgram>,
    ) -> Self {
        Self {
            app_name: settings.app_name.clone(),
            run_dir: settings.run_dir(),
            log_dir: settings.log_dir(),
            exe: exe.into(),
            config_file: config_file.into(),
            worker_log_level: settings.worker_log_level.clone(),
            broker_command: settings
                .supervise_broker
                .then(|| settings.broker_command.clone()),
            beat_command: settings.beat_command.clone(),
            queues,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.run_dir.join("supervisord.conf")
    }

    fn fallax_command(&self, verb: &str) -> String {
        format!(
            "{} -s {} {verb}",
            self.exe.display(),
            self.config_file.display()
        )
    }

    /// Command line of the worker consuming `queue`.
    ///
    /// `%%h` is supervisord's escape for a literal `%h`, which the worker
    /// keeps as part of its node name.
    pub fn worker_command(&self, queue: &str, args: &WorkerArgs) -> String {
        let mut cmd = format!(
            "{} -l {} --queues {queue} --hostname worker_{queue}@%%h",
            self.fallax_command("worker"),
            self.worker_log_level
        );
        for flag in args.to_flags() {
            cmd.push(' ');
            cmd.push_str(&flag);
        }
        cmd
    }

    /// Render the configuration text. Every line is left-trimmed.
    pub fn render(&self) -> String {
        let run = self.run_dir.display();
        let log = self.log_dir.display();
        let app = &self.app_name;

        let mut out = String::new();
        out.push_str(&format!(
            "
            [unix_http_server]
            file={run}/{app}.sock
            chmod=0777

            [supervisord]
            logfile={log}/{app}.log
            pidfile={run}/{app}.pid
            childlogdir={log}
            loglevel=info
            nodaemon=true

            [rpcinterface:supervisor]
            supervisor.rpcinterface_factory = supervisor.rpcinterface:make_main_rpcinterface

            [supervisorctl]
            serverurl=unix://{run}/{app}.sock
            "
        ));

        if let Some(broker) = &self.broker_command {
            out.push_str(&format!(
                "
                [program:redis-server]
                command={broker}
                autostart=true
                autorestart=true
                numprocs=1
                stdout_logfile={log}/redis.log
                redirect_stderr=true
                "
            ));
        }

        out.push_str(&format!(
            "
            [program:sensors]
            command={}
            autostart=true
            autorestart=true
            startsecs=10
            stopasgroup=true
            numprocs=1
            stdout_logfile={log}/sensors.log
            redirect_stderr=true
            ",
            self.fallax_command("sensors")
        ));

        if let Some(beat) = &self.beat_command {
            out.push_str(&format!(
                "
                [program:beat]
                command={beat}
                autostart=true
                autorestart=true
                startsecs=10
                stopasgroup=true
                numprocs=1
                stdout_logfile={log}/beat.log
                redirect_stderr=true
                "
            ));
        }

        for program in &self.queues {
            out.push_str(&format!(
                "
                [program:worker_{}]
                command={}
                autostart=true
                autorestart=true
                startsecs=10
                stopasgroup=true
                numprocs=1
                stdout_logfile={log}/workers.log
                redirect_stderr=true
                ",
                program.queue,
                self.worker_command(&program.queue, &program.args)
            ));
        }

        let mut text: String = out
            .lines()
            .map(str::trim_start)
            .collect::<Vec<_>>()
            .join("\n");
        text.push('\n');
        text.trim_start().to_string()
    }

    /// Render and write the configuration, returning its path.
    pub fn write(&self) -> io::Result<PathBuf> {
        let path = self.path();
        if !self.run_dir.is_dir() {
            fs::create_dir_all(&self.run_dir)?;
        }
        fs::write(&path, self.render())?;
        debug!(path = ?path, "supervisor config written");
        Ok(path)
    }
}

/// Lines of a rendered config that contain `command`.
pub fn command_lines(rendered: &str) -> Vec<&str> {
    rendered.lines().filter(|l| l.contains("command")).collect()
}

/// Read `path` and return its `command` lines.
pub fn read_command_lines(path: &Path) -> io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(command_lines(&text).into_iter().map(str::to_string).collect())
}
