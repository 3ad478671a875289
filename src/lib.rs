// src/lib.rs

pub mod cli;
pub mod config;
pub mod deployment;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod queue;
pub mod sensor;
pub mod supervisor;
pub mod task;
pub mod types;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{default_config_path, load_and_validate, ConfigFile};
use crate::deployment::Deployment;
use crate::queue::RedisBroker;
use crate::supervisor::{SupervisorConfig, SupervisorVerb};
use crate::task::QueueApp;
use crate::worker::Worker;

pub use crate::deployment::SensorSpec;

/// High-level entry point used by `main.rs`.
///
/// Builds the deployment from the config file's workflows and sensors.
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    run_with(args, |cfg, app| Deployment::from_config(cfg, app)).await
}

/// Like [`run`], with a caller-built deployment.
///
/// `build` receives the validated config and the app bound to the configured
/// broker. Every process of the installation (supervisor verbs, sensors and
/// workers) calls it, so it must register the same tasks each time.
pub async fn run_with<F>(args: CliArgs, build: F) -> Result<i32>
where
    F: FnOnce(&ConfigFile, Arc<QueueApp>) -> errors::Result<Deployment>,
{
    let Some(command) = args.command.clone() else {
        cli::print_help()?;
        println!();
        return Ok(0);
    };

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading settings from {}", config_path.display()))?;

    cfg.settings
        .ensure_directories()
        .context("creating run and log directories")?;
    println!("Settings loaded : {}\n", config_path.display());

    let broker = RedisBroker::open(&cfg.settings.broker_url())?;
    let app = QueueApp::new(cfg.settings.app_name.clone(), Arc::new(broker));
    let deployment = build(&cfg, Arc::clone(&app))?;

    match command {
        Command::Start => {
            write_supervisor_config(&cfg, &config_path, &deployment)?;
            supervisor::run_verb(SupervisorVerb::Start, &cfg.settings.supervisor_config_path()).await
        }
        Command::Restart => {
            write_supervisor_config(&cfg, &config_path, &deployment)?;
            supervisor::run_verb(SupervisorVerb::Restart, &cfg.settings.supervisor_config_path())
                .await
        }
        Command::ShowOnly => {
            let path = write_supervisor_config(&cfg, &config_path, &deployment)?;
            println!("{}", path.display());
            for line in supervisor::config::read_command_lines(&path)? {
                println!("{line}");
            }
            Ok(0)
        }
        Command::Stop => {
            supervisor::run_verb(SupervisorVerb::Stop, &cfg.settings.supervisor_config_path()).await
        }
        Command::Status => {
            let code =
                supervisor::run_verb(SupervisorVerb::Status, &cfg.settings.supervisor_config_path())
                    .await?;
            print_registered(&app);
            Ok(code)
        }
        Command::Sensors => {
            run_sensors(&deployment).await?;
            Ok(0)
        }
        Command::Worker(w) => {
            Worker::new(app, w.options()).run().await;
            Ok(0)
        }
    }
}

fn write_supervisor_config(
    cfg: &ConfigFile,
    config_path: &Path,
    deployment: &Deployment,
) -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating the fallax executable")?;
    let config_file = std::path::absolute(config_path)
        .with_context(|| format!("resolving {}", config_path.display()))?;

    let supervisor =
        SupervisorConfig::from_settings(&cfg.settings, exe, config_file, deployment.queues());
    let path = supervisor
        .write()
        .context("writing the supervisor configuration")?;
    info!(path = ?path, "supervisor config generated");
    Ok(path)
}

fn print_registered(app: &QueueApp) {
    println!("\n* Registered tasks ...");
    for (task, queue) in app.registered() {
        println!("  {task} (queue: {queue})");
    }
}

/// Run every configured sensor until Ctrl-C.
///
/// Sensors run side by side; each still handles its own events one at a
/// time.
pub async fn run_sensors(deployment: &Deployment) -> Result<()> {
    let sensors = deployment.build_sensors()?;
    if sensors.is_empty() {
        warn!("no sensor configured; nothing to watch");
        return Ok(());
    }

    let mut running = JoinSet::new();
    for sensor in sensors {
        running.spawn(async move {
            let dir = sensor.input_dir().to_path_buf();
            (dir, sensor.run().await)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((dir, Err(err))) => {
                failed += 1;
                error!(dir = ?dir, error = %err, "sensor stopped with an error");
            }
            Err(err) => {
                failed += 1;
                error!(error = %err, "sensor task panicked");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} sensor(s) failed");
    }
    Ok(())
}
