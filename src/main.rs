//! hyperstack - export sub-ranges of multi-dimensional microscopy stacks.
//!
//! This binary parses the command line, sets up logging and runs one
//! subcommand.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hyperstack::{
    config::{Cli, Command, ExportConfig, InfoConfig, InfoFormat},
    export::{ExportEvent, ExportWorker},
    source::{open_source, SourceInfo},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Export(config) => run_export(config).await,
        Command::Info(config) => run_info(config),
    }
}

/// Initialize the tracing/logging subsystem. Logs go to stderr.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "hyperstack=debug"
    } else {
        "hyperstack=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Exporting {}", config.input.display());
    info!("  Output: {}", config.output.display());
    for (name, selection) in [
        ("position", &config.position),
        ("channel", &config.channel),
        ("time", &config.time),
        ("z", &config.z),
    ] {
        if let Some(selection) = selection {
            info!("  {}: {}", name, selection);
        }
    }

    let mut handle = ExportWorker::new(config.to_request())
        .spawn_file(config.input.clone(), config.cache.source_options());

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling export");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            ExportEvent::Progress(percent) => debug!("Progress: {}%", percent),
            ExportEvent::Combination { done, total } => {
                info!("  Extracted {}/{}", done, total)
            }
            ExportEvent::Finished(path) => info!("Wrote {}", path.display()),
            ExportEvent::Failed(e) => error!("Export failed: {}", e),
            ExportEvent::Cancelled => warn!("Export cancelled"),
        }
    }

    match handle.join().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match open_source(&config.input, &config.cache.source_options()) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let info = SourceInfo::from_source(source.as_ref());
    match config.format {
        InfoFormat::Text => println!("{}", info.to_text()),
        InfoFormat::Json => match info.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to encode info: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}
