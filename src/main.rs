mod config;
mod error;
mod fetcher;
mod log_entry;
mod presentation;
mod scheduler;
mod severity;
mod tail_engine;
mod types;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use scheduler::PollStats;
use simple_logger::SimpleLogger;
use std::io;
use tail_engine::TailEngine;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = config::Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    SimpleLogger::new().with_level(level).env().init()?;

    info!("Starting api-tail");

    // Load and validate configuration before touching the network
    let settings = config::load_config(&cli)?;
    let resolved = settings.resolve()?;
    info!("Tailing {}", resolved.endpoint.url);

    let source = fetcher::HttpLogSource::new(resolved.endpoint)?;
    let cancel = CancellationToken::new();
    let (log_tx, log_rx) = mpsc::unbounded_channel();

    let printer_handle = tokio::spawn(presentation::print_entries(
        log_rx,
        io::stdout(),
        !cli.no_color,
    ));

    let mut scheduler_handle = {
        let cancel = cancel.clone();
        let scheduler = scheduler::Scheduler::new(source, resolved.query);

        tokio::spawn(async move { scheduler.run(cancel, log_tx).await })
    };

    let stopped_by_signal = tokio::select! {
        signal = shutdown_signal() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signals: {}", e);
            }
            info!("Shutting down");
            cancel.cancel();
            true
        }
        outcome = &mut scheduler_handle => {
            report_run(outcome);
            false
        }
    };

    if stopped_by_signal {
        report_run(scheduler_handle.await);
    }

    match printer_handle.await {
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => error!("Failed to write output: {}", e),
        Ok(Ok(())) | Err(_) => {}
    }

    Ok(())
}

fn report_run(outcome: Result<(TailEngine, PollStats), JoinError>) {
    match outcome {
        Ok((engine, stats)) => info!(
            "{} cycles, {} failed, {} lines emitted, {} distinct keys",
            stats.cycles,
            stats.failed_cycles,
            stats.emitted,
            engine.seen().len()
        ),
        Err(e) => error!("Poll loop task failed: {}", e),
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
