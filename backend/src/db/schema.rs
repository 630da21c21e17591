//! Static schema for the record store.
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` at database-service
//! start; there are no versioned migrations. Column renames or type changes
//! require wiping the database file.

use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Result of a schema sync operation
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub errors: Vec<String>,
}

const TABLES: &[(&str, &str)] = &[
    (
        "overlays",
        r#"
        CREATE TABLE IF NOT EXISTS overlays (
            id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
    "#,
    ),
    (
        "app_settings",
        r#"
        CREATE TABLE IF NOT EXISTS app_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
    "#,
    ),
];

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Create any missing tables. Errors are collected, not returned, so the
/// caller decides whether a partial schema is fatal.
pub async fn sync_schema(pool: &SqlitePool) -> SchemaSyncResult {
    let mut result = SchemaSyncResult::default();

    for (table, sql) in TABLES {
        let existed = table_exists(pool, table).await.unwrap_or(false);
        match sqlx::query(sql.trim()).execute(pool).await {
            Ok(_) if !existed => {
                debug!(table, "Created table");
                result.tables_created.push(table.to_string());
            }
            Ok(_) => {}
            Err(e) => {
                let msg = format!("Failed to create table {}: {}", table, e);
                warn!("{}", msg);
                result.errors.push(msg);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_sync_schema_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let first = sync_schema(&pool).await;
        assert_eq!(first.tables_created, vec!["overlays", "app_settings"]);
        assert!(first.errors.is_empty());

        let second = sync_schema(&pool).await;
        assert!(second.tables_created.is_empty());
        assert!(second.errors.is_empty());
        assert!(table_exists(&pool, "overlays").await.unwrap());
    }
}
