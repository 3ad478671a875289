// src/main.rs

use fallax::cli::{self, Command};
use fallax::logging::{self, Verbosity};
use fallax::run;

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fallax error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    let worker_level = match &args.command {
        Some(Command::Worker(w)) => w.loglevel.clone(),
        _ => None,
    };
    logging::init_logging(Verbosity {
        verbose: args.verbose,
        debug: args.debug,
        worker_level: worker_level.as_deref(),
    })?;
    run(args).await
}
