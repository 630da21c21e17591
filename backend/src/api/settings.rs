//! Settings document REST endpoints

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde_json::{Value as JsonValue, json};

use crate::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<JsonValue>)>;

fn internal(e: anyhow::Error) -> (StatusCode, Json<JsonValue>) {
    tracing::error!(error = %e, "Settings store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    let document = state.db.settings().get().await.map_err(internal)?;
    Ok(Json(JsonValue::Object(document)))
}

/// Replace the settings document
async fn put_settings(State(state): State<AppState>, Json(body): Json<JsonValue>) -> ApiResult<Json<JsonValue>> {
    let JsonValue::Object(document) = body else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Settings body must be a JSON object" })),
        ));
    };
    let stored = state.db.settings().put(document).await.map_err(internal)?;
    Ok(Json(JsonValue::Object(stored)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).put(put_settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{send, test_app};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir).await;

        let (status, body) = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));

        let document = json!({"defaultSource": "rtmp://origin/live", "overlaysEnabled": true});
        let (status, body) = send(&app, "PUT", "/api/settings", Some(document.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, document);

        let (_, body) = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(body, document);

        let (status, _) = send(&app, "PUT", "/api/settings", Some(json!("nope"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
