// src/supervisor/ctl.rs

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

/// Time allowed for `supervisorctl status` before it is killed.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit code reported when an invocation hits its timeout, as `timeout(1)`
/// does.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// systemctl-like verbs translated to supervisord calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorVerb {
    Start,
    Stop,
    Restart,
    Status,
}

impl SupervisorVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorVerb::Start => "start",
            SupervisorVerb::Stop => "stop",
            SupervisorVerb::Restart => "restart",
            SupervisorVerb::Status => "status",
        }
    }

    /// Programs to run, in order, for this verb.
    pub fn invocations(&self, config_path: &Path) -> Vec<Invocation> {
        let conf = config_path.display().to_string();
        let ctl = |args: &[&str]| {
            let mut all = vec!["-c".to_string(), conf.clone()];
            all.extend(args.iter().map(|a| a.to_string()));
            Invocation::new("supervisorctl", all)
        };

        match self {
            SupervisorVerb::Start => vec![Invocation::new("supervisord", vec!["-c".into(), conf.clone()])],
            SupervisorVerb::Stop => vec![ctl(&["stop", "all"]), ctl(&["shutdown"])],
            SupervisorVerb::Restart => vec![ctl(&["update"]), ctl(&["restart", "all"])],
            SupervisorVerb::Status => vec![ctl(&["status"]).with_timeout(STATUS_TIMEOUT)],
        }
    }
}

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run one invocation with inherited stdio and return its exit code.
pub async fn run_invocation(inv: &Invocation) -> Result<i32> {
    println!("{}", inv.command_line());

    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning `{}`", inv.command_line()))?;

    let waited = match inv.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await,
        None => Ok(child.wait().await),
    };
    let status = match waited {
        Ok(status) => status.with_context(|| format!("waiting for `{}`", inv.command_line()))?,
        Err(_) => {
            warn!(cmd = %inv.command_line(), "command timed out; killing it");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed out command");
            }
            return Ok(TIMEOUT_EXIT_CODE);
        }
    };

    let code = status.code().unwrap_or(1);
    info!(cmd = %inv.command_line(), exit_code = code, "command exited");
    Ok(code)
}

/// Run every invocation of `verb`; the exit code is the first non-zero one.
pub async fn run_verb(verb: SupervisorVerb, config_path: &Path) -> Result<i32> {
    println!("* Running supervisord {} ...", verb.as_str());

    let mut exit_code = 0;
    for inv in verb.invocations(config_path) {
        let code = run_invocation(&inv).await?;
        if exit_code == 0 {
            exit_code = code;
        }
    }
    Ok(exit_code)
}
