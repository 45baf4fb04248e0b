#![warn(missing_docs)]

//! `bmcdumpd`: the dump lifecycle daemon and its control client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use bmcdump_core::{HostTransport, StaticHostMonitor, UnsupportedHostTransport};
use bmcdump_daemon::cli::{Cli, Command};
use bmcdump_daemon::{
    build_managers, ControlServer, DaemonConfig, DumpService, NotifyWatchBackend, ServiceHandle,
};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::from_default_env())
            .init();
    }

    match &cli.command {
        Command::Serve { config } => serve(config.clone()).await,
        _ => cli.run().await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = if config_path.exists() {
        DaemonConfig::from_file(&config_path)?
    } else {
        tracing::warn!(path = %config_path.display(), "Config file not found, using defaults");
        DaemonConfig::default()
    };

    tracing::info!(managers = config.managers.len(), "bmcdumpd starting");

    let host = Arc::new(StaticHostMonitor::new(config.initial_host_state));
    let transport: Arc<dyn HostTransport> = Arc::new(UnsupportedHostTransport);
    let managers = build_managers(&config, host.clone(), transport)?;

    let (handle, events) = ServiceHandle::channel();
    let sink = handle.clone();
    let backend = NotifyWatchBackend::new(move |event| {
        if let Err(e) = sink.storage_event(event) {
            tracing::debug!(error = %e, "storage event dropped");
        }
    })?;

    let mut service = DumpService::new(
        managers,
        host,
        Box::new(backend),
        config.core_watch_dir.clone(),
        handle.clone(),
    )
    .with_ramoops_dir(config.ramoops_dir.clone());
    service.start()?;

    let control = ControlServer::bind(&config.control_socket)?;
    let control_handle = tokio::spawn(control.run(handle.clone()));

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = service.run(events) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
        _ = terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
    }

    control_handle.abort();
    match control_handle.await {
        Ok(_) => tracing::debug!("control server finished"),
        Err(e) => tracing::debug!(error = %e, "control server stopped"),
    }
    tracing::info!("bmcdumpd stopped");
    Ok(())
}
