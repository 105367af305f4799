//! Coursegate server: application entry point.
//!
//! Connects to SurrealDB, then runs the expiry scheduler until the
//! process receives Ctrl-C.

mod config;

use coursegate_auth::{AuthService, TracingNotifier};
use coursegate_db::{DbManager, SurrealIdentityRepository};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigLoader;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coursegate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    tracing::info!("Starting Coursegate server...");

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Coursegate server failed");
        std::process::exit(1);
    }

    tracing::info!("Coursegate server stopped.");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::from_env().load()?;
    let db = DbManager::connect(&config.db).await?;

    let repo = SurrealIdentityRepository::new(db.client().clone());
    let service = AuthService::new(repo, config.auth);
    let scheduler = Arc::new(service.scheduler(TracingNotifier, config.scheduler)).start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    scheduler.shutdown().await;
    Ok(())
}
