//! Application settings database operations
//!
//! Settings are a single JSON object stored under one well-known key.

use anyhow::Result;
use serde_json::{Map, Value as JsonValue};
use sqlx::SqlitePool;

use crate::db::sqlite_helpers::{now_iso8601, str_to_object};

const SETTINGS_KEY: &str = "settings";

/// Settings repository for database operations
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the settings document; `{}` before the first write.
    pub async fn get(&self) -> Result<Map<String, JsonValue>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM app_settings WHERE key = ?")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((value,)) => str_to_object(&value),
            None => Ok(Map::new()),
        }
    }

    /// Replace the settings document.
    pub async fn put(&self, document: Map<String, JsonValue>) -> Result<Map<String, JsonValue>> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(SETTINGS_KEY)
        .bind(serde_json::to_string(&document)?)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        Ok(document)
    }
}
