//! Host monitoring agent
//!
//! This binary runs as a host service, sampling system and container
//! resources on a schedule and reconciling them against the remote
//! record store, with a local HTTP surface for health and control.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_lib::Agent;

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting monitoring agent");

    let config = match config::AgentConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            std::process::exit(1);
        }
    };
    info!(
        agent_id = %config.agent_id,
        store_enabled = config.store_enabled,
        check_interval_secs = config.check_interval_secs,
        "Agent configured"
    );

    let mut agent = Agent::new(config.agent_options())?;
    if let Err(err) = agent.init().await {
        error!(error = %err, "Agent initialization failed");
        std::process::exit(1);
    }

    let shutdown = agent.shutdown_sender();
    let app_state = Arc::new(api::AppState::new(
        agent.state(),
        agent.store_client(),
        config.agent_id.clone(),
    ));

    let api_handle = tokio::spawn(api::serve(
        config.health_check_port,
        app_state,
        shutdown.subscribe(),
    ));
    let agent_handle = tokio::spawn(agent.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    let _ = shutdown.send(());

    match agent_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Agent loop exited with error"),
        Err(err) => warn!(error = %err, "Agent task panicked"),
    }

    // The API server gets a bounded grace period to drain
    match tokio::time::timeout(Duration::from_secs(5), api_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!(error = %err, "API server exited with error"),
        Ok(Err(err)) => warn!(error = %err, "API task panicked"),
        Err(_) => warn!("API server did not stop within grace period"),
    }

    info!("Shutdown complete");
    Ok(())
}
