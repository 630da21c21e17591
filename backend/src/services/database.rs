//! Database service: wraps the SQLite pool for lifecycle (start/stop/health) and dependencies.
//!
//! Services that need the record store declare `dependencies: ["database"]`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::schema::sync_schema;
use crate::db::{Database, connect_with_retry};
use crate::services::manager::{Service, ServiceHealth};

/// Configuration for the database service (connection URL, timeouts, etc.).
#[derive(Debug, Clone)]
pub struct DatabaseServiceConfig {
    /// SQLite connection URL (e.g. `sqlite://./data/livecast.db?mode=rwc` or `sqlite::memory:`).
    pub database_url: String,
    /// How long to retry connecting before giving up.
    pub connect_timeout: Duration,
}

impl DatabaseServiceConfig {
    pub fn from_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }
}

impl Default for DatabaseServiceConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/livecast.db?mode=rwc".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Service that owns the database pool and provides start/stop/health.
pub struct DatabaseService {
    db: Database,
}

impl DatabaseService {
    /// Create a new database service with an already-connected pool.
    /// Use [from_config](Self::from_config) to create from URL and timeout.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create and connect the database service from config.
    pub async fn from_config(config: DatabaseServiceConfig) -> Result<Self> {
        let db = connect_with_retry(&config.database_url, config.connect_timeout)
            .await
            .context("Database service: connect_with_retry failed")?;
        Ok(Self::new(db))
    }

    /// Access the database (e.g. to clone for app state). Valid until [Service::stop] is called.
    pub fn db(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl Service for DatabaseService {
    fn name(&self) -> &str {
        "database"
    }

    async fn start(&self) -> Result<()> {
        info!(service = "database", "Database service starting");
        // Pool is already connected by caller; just verify
        self.db.ping().await?;

        let sync_result = sync_schema(self.db.pool()).await;
        if !sync_result.tables_created.is_empty() {
            info!(
                service = "database",
                tables = ?sync_result.tables_created,
                "Created tables"
            );
        }
        if let Some(err) = sync_result.errors.first() {
            anyhow::bail!("Schema sync failed: {}", err);
        }

        info!(service = "database", "Database service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.db.close().await;
        info!(service = "database", "Database service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        match self.db.ping().await {
            Ok(()) => Ok(ServiceHealth::healthy()),
            Err(e) => {
                warn!(service = "database", error = %e, "Health check failed");
                Ok(ServiceHealth::unhealthy(e.to_string()))
            }
        }
    }
}
