//! # kc-server
//!
//! Entry point for the audit server.

#![forbid(unsafe_code)]

use kc_server::{Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        reconciliation = config.reconciliation_enabled(),
        "Keycloak admin audit server starting"
    );

    Server::new(config).await?.run().await
}
