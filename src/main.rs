use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, prelude::*};

use vecingest::cli::commands::{handle_config, handle_ingest, handle_status};
use vecingest::cli::output::render_failure;
use vecingest::cli::{Cli, Commands, LogFormat};
use vecingest::models::OutputFormat;

/// Logs go to stderr; stdout carries command output only.
fn init_tracing(verbose: bool, log_format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("failed to initialize logging: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("received shutdown signal, finishing current record");
        on_signal.cancel();
    });

    if let Err(e) = run_command(cli.command, cli.config.as_deref(), format, verbose, cancel).await {
        eprint!("{}", render_failure(format, &e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command(
    command: Commands,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        Commands::Ingest(args) => {
            handle_ingest(args, config_path, format, verbose, cancel).await?;
        }
        Commands::Status => {
            handle_status(config_path, format, verbose).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, config_path, format, verbose).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
