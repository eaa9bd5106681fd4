mod config;
mod consolidated;
mod device_log;
mod display;
mod error;
mod log_collector;
mod log_entry;
mod parser;
mod receiver;
mod session;
mod stats;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;

    let level = if config.debug { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialize logger")?;

    if !config.display.color {
        colored::control::set_override(false);
    }

    info!("Starting udp-log-listener");

    let transport = config.transport();
    let receiver = match receiver::Receiver::bind(&transport).await {
        Ok(receiver) => receiver,
        Err(e) => {
            if e.is_permission_denied() {
                error!("Permission denied. Try running as administrator or use a port > 1024");
            }
            return Err(e).with_context(|| format!("Failed to listen on {}", transport));
        }
    };
    log::debug!("Socket bound to {}", receiver.local_addr()?);

    let shutdown = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move {
            wait_for_signal().await;
            warn!("Received interrupt signal, stopping...");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    let mut listener = log_collector::Listener::new(&config, io::stdout(), chrono::Local::now());
    listener.announce(&transport);

    let summary = log_collector::run(listener, receiver, shutdown).await;
    summary.report();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
