//! Overlay document database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{decode_err, now_iso8601, str_to_datetime, str_to_object, str_to_uuid};

/// Keys owned by the store; stripped from incoming documents.
const RESERVED_KEYS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// An overlay record in the database
#[derive(Debug, Clone)]
pub struct OverlayRecord {
    pub id: Uuid,
    pub document: Map<String, JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for OverlayRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let document_str: String = row.try_get("document")?;
        let created_str: String = row.try_get("created_at")?;
        let updated_str: String = row.try_get("updated_at")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(decode_err)?,
            document: str_to_object(&document_str).map_err(decode_err)?,
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
            updated_at: str_to_datetime(&updated_str).map_err(decode_err)?,
        })
    }
}

impl OverlayRecord {
    /// Wire shape: the document's fields with `id`, `createdAt` and
    /// `updatedAt` merged in.
    pub fn to_json(&self) -> JsonValue {
        let mut out = self.document.clone();
        out.insert("id".to_string(), JsonValue::from(self.id.to_string()));
        out.insert("createdAt".to_string(), JsonValue::from(self.created_at.to_rfc3339()));
        out.insert("updatedAt".to_string(), JsonValue::from(self.updated_at.to_rfc3339()));
        JsonValue::Object(out)
    }
}

fn strip_reserved(mut document: Map<String, JsonValue>) -> Map<String, JsonValue> {
    for key in RESERVED_KEYS {
        document.remove(key);
    }
    document
}

/// Overlay repository for database operations
pub struct OverlayRepository {
    pool: SqlitePool,
}

impl OverlayRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List all overlays, oldest first
    pub async fn list(&self) -> Result<Vec<OverlayRecord>> {
        let records = sqlx::query_as::<_, OverlayRecord>(
            "SELECT id, document, created_at, updated_at FROM overlays ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Get an overlay by id
    pub async fn get(&self, id: Uuid) -> Result<Option<OverlayRecord>> {
        let record = sqlx::query_as::<_, OverlayRecord>(
            "SELECT id, document, created_at, updated_at FROM overlays WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Store a new overlay document under a fresh id
    pub async fn create(&self, document: Map<String, JsonValue>) -> Result<OverlayRecord> {
        let id = Uuid::new_v4();
        let document = strip_reserved(document);
        let now = now_iso8601();

        sqlx::query(
            "INSERT INTO overlays (id, document, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(serde_json::to_string(&document)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Overlay {} missing after insert", id))
    }

    /// Shallow-merge `patch` into the stored document. Returns None for an
    /// unknown id.
    pub async fn update(&self, id: Uuid, patch: Map<String, JsonValue>) -> Result<Option<OverlayRecord>> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT document FROM overlays WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some((document_str,)) = existing else {
            return Ok(None);
        };

        let mut document = str_to_object(&document_str)?;
        document.extend(strip_reserved(patch));

        sqlx::query("UPDATE overlays SET document = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&document)?)
            .bind(now_iso8601())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Delete an overlay. Returns whether a row was removed.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM overlays WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::schema::sync_schema;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn repo() -> OverlayRepository {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sync_schema(db.pool()).await;
        db.overlays()
    }

    fn object(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let created = repo
            .create(object(json!({"text": "LIVE", "x": 10, "id": "ignored"})))
            .await
            .unwrap();

        assert_eq!(created.document.get("text"), Some(&json!("LIVE")));
        assert!(!created.document.contains_key("id"));

        let fetched = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.document, created.document);

        let wire = fetched.to_json();
        assert_eq!(wire["id"], json!(created.id.to_string()));
        assert_eq!(wire["x"], json!(10));
        assert!(wire.get("createdAt").is_some());
    }

    #[tokio::test]
    async fn test_update_merges_shallowly() {
        let repo = repo().await;
        let created = repo
            .create(object(json!({"text": "LIVE", "style": {"color": "red", "size": 12}})))
            .await
            .unwrap();

        let updated = repo
            .update(created.id, object(json!({"style": {"color": "blue"}, "visible": false})))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            JsonValue::Object(updated.document),
            json!({"text": "LIVE", "style": {"color": "blue"}, "visible": false})
        );
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let repo = repo().await;
        let id = Uuid::new_v4();

        assert!(repo.get(id).await.unwrap().is_none());
        assert!(repo.update(id, Map::new()).await.unwrap().is_none());
        assert!(!repo.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let repo = repo().await;
        let first = repo.create(object(json!({"n": 1}))).await.unwrap();
        repo.create(object(json!({"n": 2}))).await.unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 2);
        assert!(repo.delete(first.id).await.unwrap());

        let remaining = repo.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].document.get("n"), Some(&json!(2)));
    }
}
