// src/worker/command.rs

//! Built-in task function running a shell command template.
//!
//! Workflows declared in the config file have no Rust function of their own;
//! they bind [`command_task`] with the workflow's `cmd`. Before running, the
//! template's `{placeholder}`s are filled from the invocation:
//!
//! | placeholder      | value                                             |
//! |------------------|---------------------------------------------------|
//! | `{fp}`           | path of the file as it arrived in the sensor dir  |
//! | `{input}`        | the copy of that file in the context `in` dir     |
//! | `{filename}`     | the original file name                            |
//! | `{input_subdir}` | sub-directory below the watched root              |
//! | `{name}`         | context name                                      |
//! | `{input_dir}`    | context `in` directory                            |
//! | `{output_dir}`   | context `out` directory                           |
//! | `{tmp_dir}`      | context `tmp` directory                           |
//! | `{<param>}`      | any extra context parameter                       |
//!
//! Unknown placeholders are left as written.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context, Result};
use regex::{Captures, Regex};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::task::{task_fn, TaskFn, TaskInvocation};

static PLACEHOLDER: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}"));

/// A [`TaskFn`] running `template` through the platform shell.
pub fn command_task(template: impl Into<String>) -> TaskFn {
    let template: String = template.into();
    task_fn(move |inv| {
        let template = template.clone();
        async move { run_command(&template, &inv).await }
    })
}

/// Values available to a command template for one invocation.
pub fn template_values(inv: &TaskInvocation) -> BTreeMap<String, String> {
    let ctx = &inv.context;
    let mut values = BTreeMap::new();

    for (key, value) in ctx.extra() {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        values.insert(key.clone(), rendered);
    }

    let fp = inv.file_path().unwrap_or_default().to_string();
    let filename = inv
        .meta_str("original_filename")
        .map(str::to_string)
        .or_else(|| {
            Path::new(&fp)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    let input = if filename.is_empty() {
        String::new()
    } else {
        display(&ctx.input_dir().join(&filename))
    };

    values.insert("fp".into(), fp);
    values.insert("input".into(), input);
    values.insert("filename".into(), filename);
    values.insert(
        "input_subdir".into(),
        inv.meta_str("input_subdir").unwrap_or(".").to_string(),
    );
    values.insert("name".into(), ctx.name().to_string());
    values.insert("input_dir".into(), display(&ctx.input_dir()));
    values.insert("output_dir".into(), display(&ctx.output_dir()));
    values.insert("tmp_dir".into(), display(&ctx.tmp_dir()));
    values
}

/// Replace `{key}` occurrences with `values[key]`.
pub fn expand_template(template: &str, values: &BTreeMap<String, String>) -> Result<String> {
    let re = PLACEHOLDER
        .as_ref()
        .map_err(|e| anyhow!("invalid placeholder pattern: {e}"))?;
    Ok(re
        .replace_all(template, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned())
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn run_command(template: &str, inv: &TaskInvocation) -> Result<()> {
    let values = template_values(inv);
    let command_line = expand_template(template, &values)?;

    info!(cmd = %command_line, "starting command");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&command_line);
        c
    };

    let ctx = &inv.context;
    cmd.env("FALLAX_FP", &values["fp"])
        .env("FALLAX_INPUT", &values["input"])
        .env("FALLAX_FILENAME", &values["filename"])
        .env("FALLAX_INPUT_DIR", ctx.input_dir())
        .env("FALLAX_OUTPUT_DIR", ctx.output_dir())
        .env("FALLAX_TMP_DIR", ctx.tmp_dir())
        .env("FALLAX_TASK", &inv.task_name)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning command for task '{}'", inv.task_name))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_logger = async {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("stdout: {line}");
            }
        }
    };
    let err_logger = async {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stderr: {line}");
            }
        }
    };

    let (status, (), ()) = tokio::join!(child.wait(), out_logger, err_logger);
    let status =
        status.with_context(|| format!("waiting for command of task '{}'", inv.task_name))?;

    let code = status.code().unwrap_or(-1);
    info!(exit_code = code, success = status.success(), "command exited");

    if !status.success() {
        bail!("command `{command_line}` exited with status {code}");
    }
    Ok(())
}
