//! Overlay document REST endpoints
//!
//! Overlays are free-form JSON objects; the store only owns `id`,
//! `createdAt` and `updatedAt`.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal(e: anyhow::Error) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(error = %e, "Overlay store operation failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn parse_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| error(StatusCode::NOT_FOUND, format!("Overlay {} not found", id)))
}

fn into_object(body: JsonValue) -> ApiResult<Map<String, JsonValue>> {
    match body {
        JsonValue::Object(map) => Ok(map),
        _ => Err(error(StatusCode::BAD_REQUEST, "Overlay body must be a JSON object")),
    }
}

async fn list_overlays(State(state): State<AppState>) -> ApiResult<Json<Vec<JsonValue>>> {
    let records = state.db.overlays().list().await.map_err(internal)?;
    Ok(Json(records.iter().map(|r| r.to_json()).collect()))
}

async fn create_overlay(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let document = into_object(body)?;
    let record = state.db.overlays().create(document).await.map_err(internal)?;
    tracing::debug!(overlay_id = %record.id, "Overlay created");
    Ok((StatusCode::CREATED, Json(record.to_json())))
}

async fn get_overlay(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<JsonValue>> {
    let uuid = parse_id(&id)?;
    match state.db.overlays().get(uuid).await.map_err(internal)? {
        Some(record) => Ok(Json(record.to_json())),
        None => Err(error(StatusCode::NOT_FOUND, format!("Overlay {} not found", id))),
    }
}

async fn update_overlay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let uuid = parse_id(&id)?;
    let patch = into_object(body)?;
    match state.db.overlays().update(uuid, patch).await.map_err(internal)? {
        Some(record) => Ok(Json(record.to_json())),
        None => Err(error(StatusCode::NOT_FOUND, format!("Overlay {} not found", id))),
    }
}

async fn delete_overlay(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let uuid = parse_id(&id)?;
    if state.db.overlays().delete(uuid).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(StatusCode::NOT_FOUND, format!("Overlay {} not found", id)))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/overlays", get(list_overlays).post(create_overlay))
        .route(
            "/overlays/{id}",
            get(get_overlay).put(update_overlay).delete(delete_overlay),
        )
}
