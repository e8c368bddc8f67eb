//! # kc-server
//!
//! HTTP server for the Keycloak admin audit API.
//!
//! Wires the PostgreSQL store, the Keycloak admin client and the audit API
//! together, serves health probes, and runs the periodic reconciliation
//! job.
//!
//! ## Usage
//!
//! ```ignore
//! use kc_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod router;
pub mod scheduler;
pub mod state;

pub use config::ServerConfig;
pub use router::create_router;
pub use scheduler::spawn_reconciliation;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use kc_admin_api::{AdminAuth, AuthState, Permission, StaticTokenValidator, MASTER_REALM};
use kc_audit::{KeycloakAdminClient, ReconciliationJob, SystemClock};
use kc_storage_sql::{PgStore, PoolConfig};
use sqlx::PgPool;
use tokio::net::TcpListener;

/// Subject id recorded for requests made with the service token.
pub const SERVICE_SUBJECT: &str = "service-account-audit";

/// The audit server.
pub struct Server {
    config: ServerConfig,
    pool: PgPool,
}

impl Server {
    /// Creates a new server instance.
    ///
    /// Connects the database pool and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let pool_config = PoolConfig::new(&config.database_url)
            .max_connections(config.db_max_connections)
            .min_connections(config.db_min_connections);

        let pool = kc_storage_sql::create_pool(&pool_config).await?;

        tracing::info!("Database connection pool created");

        Ok(Self { config, pool })
    }

    /// Runs the server until it receives a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let store = Arc::new(PgStore::new(self.pool.clone()));
        let upstream = Arc::new(KeycloakAdminClient::new(
            &self.config.upstream_url,
            &self.config.upstream_token,
        )?);
        let clock = Arc::new(SystemClock);

        let reconciler = spawn_reconciliation(
            ReconciliationJob::new(Arc::clone(&store), Arc::clone(&upstream), clock.clone()),
            self.config.reconcile_realms.clone(),
            self.config.reconcile_interval,
        );

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let auth = auth_state(&self.config);
        let state = AppState::new(self.config, store, upstream, clock);
        let app = create_router(state, auth);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(handle) = reconciler {
            handle.abort();
        }
        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the database pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Builds the token validator from configuration.
///
/// `KC_ADMIN_TOKEN` authenticates as a master realm administrator.
#[must_use]
pub fn auth_state(config: &ServerConfig) -> AuthState {
    let validator = match &config.admin_token {
        Some(token) => StaticTokenValidator::new().with_token(
            token.clone(),
            AdminAuth::new(SERVICE_SUBJECT, SERVICE_SUBJECT, MASTER_REALM)
                .with_permission(Permission::RealmAdmin),
        ),
        None => {
            tracing::warn!("KC_ADMIN_TOKEN is not set; every audit request will be rejected");
            StaticTokenValidator::new()
        }
    };
    AuthState::new(validator)
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
