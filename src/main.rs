//! # Waiting Room
//!
//! Admission-control service for high-demand ticket sales.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Queue store connection
//! - Admission workers and the HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use waiting_room::config::Settings;
use waiting_room::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    waiting_room::telemetry::init_tracing();

    info!("Starting waiting room...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        backend = ?settings.queue.backend,
        workers = settings.queue.max_workers,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
