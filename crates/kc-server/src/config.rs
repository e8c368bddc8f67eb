//! Server configuration.
//!
//! Configuration is loaded from environment variables (and a `.env` file if
//! present) with sensible defaults.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `KC_HOST` | `0.0.0.0` |
//! | `KC_PORT` | `8080` |
//! | `DATABASE_URL` | required |
//! | `KC_DB_MIN_CONNECTIONS` | `1` |
//! | `KC_DB_MAX_CONNECTIONS` | `10` |
//! | `KC_UPSTREAM_URL` | required |
//! | `KC_UPSTREAM_TOKEN` | required |
//! | `KC_ADMIN_TOKEN` | unset (no caller can authenticate) |
//! | `KC_RECONCILE_INTERVAL_SECS` | `0` (disabled) |
//! | `KC_RECONCILE_REALMS` | empty |
//! | `KC_CORS_ORIGINS` | `*` |
//! | `RUST_LOG` | `info` |

use std::time::Duration;

use anyhow::Context;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host to bind to.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Database connection URL.
    pub database_url: String,

    /// Minimum database connections.
    pub db_min_connections: u32,

    /// Maximum database connections.
    pub db_max_connections: u32,

    /// Keycloak base URL.
    pub upstream_url: String,

    /// Bearer token for the Keycloak admin API.
    pub upstream_token: String,

    /// Service token accepted as a master realm administrator.
    pub admin_token: Option<String>,

    /// Period of the reconciliation job; zero disables it.
    pub reconcile_interval: Duration,

    /// Realms the reconciliation job checks.
    pub reconcile_realms: Vec<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Log filter.
    pub log_level: String,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name).map_or(Ok(default), |v| {
        v.trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {v}"))
    })
}

fn list(name: &str) -> Vec<String> {
    var(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let database_url =
            var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;
        let upstream_url =
            var("KC_UPSTREAM_URL").context("KC_UPSTREAM_URL environment variable is required")?;
        let upstream_token = var("KC_UPSTREAM_TOKEN")
            .context("KC_UPSTREAM_TOKEN environment variable is required")?;

        let mut cors_origins = list("KC_CORS_ORIGINS");
        if cors_origins.is_empty() {
            cors_origins.push("*".to_string());
        }

        Ok(Self {
            host: var("KC_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("KC_PORT", 8080)?,
            database_url,
            db_min_connections: parsed("KC_DB_MIN_CONNECTIONS", 1)?,
            db_max_connections: parsed("KC_DB_MAX_CONNECTIONS", 10)?,
            upstream_url,
            upstream_token,
            admin_token: var("KC_ADMIN_TOKEN"),
            reconcile_interval: Duration::from_secs(parsed("KC_RECONCILE_INTERVAL_SECS", 0)?),
            reconcile_realms: list("KC_RECONCILE_REALMS"),
            cors_origins,
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing(database_url: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
            database_url: database_url.to_string(),
            db_min_connections: 1,
            db_max_connections: 5,
            log_level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Checks if the reconciliation job should run.
    #[must_use]
    pub fn reconciliation_enabled(&self) -> bool {
        !self.reconcile_interval.is_zero() && !self.reconcile_realms.is_empty()
    }

    /// Checks if any origin is allowed.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/keycloak_audit".to_string(),
            db_min_connections: 1,
            db_max_connections: 10,
            upstream_url: "http://localhost:8180".to_string(),
            upstream_token: String::new(),
            admin_token: None,
            reconcile_interval: Duration::ZERO,
            reconcile_realms: Vec::new(),
            cors_origins: vec!["*".to_string()],
            log_level: "info".to_string(),
        }
    }
}
