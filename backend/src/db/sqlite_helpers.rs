//! SQLite helper utilities for type conversion
//!
//! SQLite has no native UUID, JSON or timestamp types. Ids are stored as
//! text, documents as serialized JSON text, timestamps as RFC 3339 text.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Parse a SQLite string back to a UUID
#[inline]
pub fn str_to_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| anyhow!("Invalid UUID '{}': {}", s, e))
}

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an ISO8601 string to DateTime
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

/// Parse a stored JSON object. Anything that is not an object is an error.
pub fn str_to_object(s: &str) -> Result<Map<String, JsonValue>> {
    match serde_json::from_str::<JsonValue>(s) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(anyhow!("Stored document is not a JSON object: {}", other)),
        Err(e) => Err(anyhow!("JSON parse error: {}", e)),
    }
}

/// Map a conversion failure into a row decode error.
pub fn decode_err(e: anyhow::Error) -> sqlx::Error {
    sqlx::Error::Decode(e.into())
}
