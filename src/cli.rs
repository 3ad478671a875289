// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::worker::WorkerOptions;

/// Command-line arguments for `fallax`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fallax",
    version,
    about = "Dispatch files arriving in watched directories to queued workflows.",
    long_about = None
)]
pub struct CliArgs {
    /// Increase verbosity (`-v`: info, with fallax at debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Set every logger to debug.
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to the config file (TOML).
    ///
    /// Default: `$FALLAX_CONFIG`, else `Fallax.toml` in the current directory.
    #[arg(
        short = 's',
        long = "config-module",
        alias = "config_module",
        value_name = "PATH",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Generate the supervisor config and start the supervisor.
    Start,
    /// Regenerate the supervisor config, reload it and restart all programs.
    Restart,
    /// Regenerate the supervisor config and print its command lines.
    #[command(name = "show_only", alias = "show-only")]
    ShowOnly,
    /// Stop all supervised programs and shut the supervisor down.
    Stop,
    /// Show supervised program status and registered tasks.
    Status,
    /// Run the configured file sensors (supervised program).
    Sensors,
    /// Run a queue worker (supervised program).
    Worker(WorkerCommand),
}

#[derive(Debug, Clone, Args)]
pub struct WorkerCommand {
    /// Queues to consume.
    #[arg(short = 'Q', long, value_delimiter = ',', required = true, num_args = 1..)]
    pub queues: Vec<String>,

    /// Worker node name, e.g. `worker_convert@host`.
    #[arg(short = 'n', long)]
    pub hostname: Option<String>,

    /// Number of tasks run at the same time.
    #[arg(short, long, default_value_t = crate::types::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Pool bounds as `max,min`; the maximum caps `--concurrency`.
    #[arg(long, value_name = "MAX,MIN")]
    pub autoscale: Option<String>,

    /// Memory ceiling per consumer in KiB. Accepted, not enforced.
    #[arg(long, value_name = "KB")]
    pub max_memory_per_child: Option<u64>,

    /// Worker log level (debug, info, warning, error, critical).
    #[arg(short = 'l', long)]
    pub loglevel: Option<String>,
}

impl WorkerCommand {
    pub fn options(&self) -> WorkerOptions {
        WorkerOptions {
            queues: self.queues.clone(),
            hostname: self.hostname.clone(),
            concurrency: self.concurrency,
            autoscale: self.autoscale.clone(),
            max_memory_per_child: self.max_memory_per_child,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Print the top-level help to stdout.
pub fn print_help() -> std::io::Result<()> {
    CliArgs::command().print_help()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_and_verb() {
        let args = CliArgs::try_parse_from(["fallax", "-vv", "-s", "conf.toml", "status"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(!args.debug);
        assert_eq!(args.config, Some(PathBuf::from("conf.toml")));
        assert!(matches!(args.command, Some(Command::Status)));
    }

    #[test]
    fn accepts_underscore_spellings() {
        let args =
            CliArgs::try_parse_from(["fallax", "--config_module", "c.toml", "show_only"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(args.command, Some(Command::ShowOnly)));
    }

    #[test]
    fn no_verb_is_allowed() {
        let args = CliArgs::try_parse_from(["fallax", "-d"]).unwrap();
        assert!(args.debug);
        assert!(args.command.is_none());
    }

    #[test]
    fn worker_command_line_from_supervisor_config_parses() {
        let args = CliArgs::try_parse_from([
            "fallax",
            "-s",
            "/etc/fallax.toml",
            "worker",
            "-l",
            "warning",
            "--queues",
            "convert",
            "--hostname",
            "worker_convert@%h",
            "--autoscale",
            "100,1",
            "--concurrency",
            "2",
            "--max-memory-per-child",
            "10000",
        ])
        .unwrap();

        let Some(Command::Worker(w)) = args.command else {
            panic!("expected worker subcommand");
        };
        let opts = w.options();
        assert_eq!(opts.queues, vec!["convert".to_string()]);
        assert_eq!(opts.concurrency, 2);
        assert_eq!(opts.autoscale.as_deref(), Some("100,1"));
        assert_eq!(opts.max_memory_per_child, Some(10_000));
        assert_eq!(w.loglevel.as_deref(), Some("warning"));
    }
}
