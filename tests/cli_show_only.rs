// tests/cli_show_only.rs

mod common;

use std::fs;

use clap::Parser;
use common::{init_tracing, TestResult};
use fallax::cli::{CliArgs, Command};
use fallax::supervisor::command_lines;
use tempfile::tempdir;

#[tokio::test]
async fn show_only_writes_supervisor_config_for_every_queue() -> TestResult {
    init_tracing();
    let base = tempdir()?;
    let config = base.path().join("fallax.toml");
    fs::write(
        &config,
        format!(
            r#"
[settings]
base_dir = "{base}"

[workflow.convert]
cmd = "true"
worker = {{ concurrency = 2 }}

[[sensor]]
input_dir = "{base}/in"
workflows = ["convert"]
"#,
            base = base.path().display()
        ),
    )?;

    let args = CliArgs::try_parse_from([
        "fallax",
        "-s",
        config.to_str().expect("utf-8 path"),
        "show_only",
    ])?;
    let code = fallax::run(args).await?;

    assert_eq!(code, 0);
    assert!(base.path().join("log").is_dir());
    let rendered = fs::read_to_string(base.path().join("run/supervisord.conf"))?;
    let commands = command_lines(&rendered);
    assert!(commands.iter().any(|l| l.contains("--queues default ")));
    let convert = commands
        .iter()
        .find(|l| l.contains("--queues convert "))
        .expect("convert worker");
    assert!(convert.contains("--concurrency 2"));
    assert!(convert.contains(&format!("-s {} worker", config.display())));
    assert!(commands.iter().any(|l| l.ends_with(" sensors")));

    // Each generated worker line parses back to exactly its own queue.
    for line in commands.iter().filter(|l| l.contains(" worker ")) {
        let argv: Vec<&str> = std::iter::once("fallax")
            .chain(line.trim_start_matches("command=").split_whitespace().skip(1))
            .collect();
        let parsed = CliArgs::try_parse_from(argv)?;
        let Some(Command::Worker(worker)) = parsed.command else {
            panic!("not a worker command: {line}");
        };
        assert_eq!(worker.queues.len(), 1, "{line}");
        assert!(line.contains(&format!("worker_{}@", worker.queues[0])), "{line}");
    }
    Ok(())
}

#[tokio::test]
async fn no_verb_prints_help_and_succeeds() -> TestResult {
    let args = CliArgs::try_parse_from(["fallax"])?;
    assert_eq!(fallax::run(args).await?, 0);
    Ok(())
}
