//! Database connection and operations

pub mod overlays;
pub mod schema;
pub mod settings;
pub mod sqlite_helpers;

use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;

pub use overlays::{OverlayRecord, OverlayRepository};
pub use settings::SettingsRepository;

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new database connection pool.
    ///
    /// In-memory databases get a single connection: every connection to
    /// `sqlite::memory:` would otherwise see its own empty database.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL '{}'", url))?
            .create_if_missing(true);

        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap reachability check used by health endpoints
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get an overlay repository
    pub fn overlays(&self) -> OverlayRepository {
        OverlayRepository::new(self.pool.clone())
    }

    /// Get a settings repository
    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }
}

/// Connect, retrying until `timeout` elapses. The parent directory of a file
/// database is created first.
pub async fn connect_with_retry(url: &str, timeout: Duration) -> Result<Database> {
    ensure_parent_dir(url).await?;

    let deadline = Instant::now() + timeout;
    let retry_interval = Duration::from_secs(1);
    loop {
        match Database::connect(url).await {
            Ok(db) => return Ok(db),
            Err(e) if Instant::now() + retry_interval < deadline => {
                warn!(
                    service = "database",
                    error = %e,
                    retry_in_secs = retry_interval.as_secs(),
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(retry_interval).await;
            }
            Err(e) => return Err(e).context("Database connection failed"),
        }
    }
}

async fn ensure_parent_dir(url: &str) -> Result<()> {
    let Some(path) = sqlite_file_path(url) else {
        return Ok(());
    };
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory '{}'", parent.display()))?;
        }
    }
    Ok(())
}

/// File path portion of a `sqlite:` URL, or None for in-memory databases.
fn sqlite_file_path(url: &str) -> Option<&str> {
    if url.contains(":memory:") {
        return None;
    }
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty()).then_some(path)
}
