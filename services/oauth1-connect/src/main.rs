//! OAuth 1.0a connect tool
//!
//! Single-binary command-line client that:
//! 1. Discovers a site's OAuth 1.0a endpoints
//! 2. Runs the three-legged authorization flow (authorize, then callback)
//! 3. Sends signed API requests with the stored token credentials
//!
//! Credentials live in a local JSON file; logs go to stderr as JSON and
//! command output goes to stdout.

mod cli;
mod commands;
mod config;
mod error;
mod recorder;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth1_auth::{Clock, SystemClock};
use oauth1_client::{Collaborators, Connection};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestRequester;

use crate::cli::Command;
use crate::config::Config;
use crate::recorder::LastErrorRecorder;
use crate::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = cli::parse(&args)?;
    if matches!(invocation.command, Command::Help) {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config_path = Config::resolve_path(invocation.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        storage = %config.storage.path.display(),
        timeout_secs = config.http.timeout_secs,
        "configuration loaded"
    );

    let store = Arc::new(
        FileStore::load(config.storage.path.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to open credential file {}",
                    config.storage.path.display()
                )
            })?,
    );
    let connections = store
        .connection_count()
        .await
        .context("failed to read credential file")?;
    info!(
        path = %store.path().display(),
        connections,
        "credential store ready"
    );
    let requester = Arc::new(
        ReqwestRequester::new(Duration::from_secs(config.http.timeout_secs))
            .context("failed to build HTTP client")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let recorder = Arc::new(LastErrorRecorder::new(clock.clone()));

    let collaborators = Collaborators::new(requester, store.clone())
        .with_clock(clock)
        .with_diagnostics(recorder.clone());
    let connection = Connection::new(config.connection_config()?, collaborators)
        .context("invalid connection settings")?;

    let outcome = commands::execute(&connection, store.as_ref(), invocation.command).await;

    // Persist failures even when the command itself failed
    if let Err(e) = recorder.persist(store.as_ref()).await {
        warn!(error = %e, "failed to persist last error");
    }

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
