use ovms_link::cli::Cli;
use ovms_link::logger::{default_log_dir, initialize as LoggerInitialize};
use ovms_link::runner::run;

use std::fs::create_dir_all;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(log_dir) = cli.log_dir.clone().or_else(default_log_dir) else {
        eprintln!("No platform data directory, pass --log-dir");
        return ExitCode::FAILURE;
    };

    if let Err(e) = create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {}: {e}", log_dir.display());
        return ExitCode::FAILURE;
    }

    // Logger first so config and connection problems are recorded
    if let Err(e) = LoggerInitialize(&log_dir) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    info!("ovms-link {} starting", env!("CARGO_PKG_VERSION"));
    info!("Log directory: {}", log_dir.display());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
