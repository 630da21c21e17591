//! Stream control REST endpoints
//!
//! Thin mapping from supervisor outcomes to JSON payloads. Every failure
//! carries its error kind and operator-facing remediation hints.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::services::stream::{StreamError, StreamErrorKind, StreamStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamRequest {
    #[serde(default)]
    pub source_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamResponse {
    pub success: bool,
    pub playlist_url: String,
    pub source_address: String,
    pub mode: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamErrorResponse {
    pub success: bool,
    pub error_kind: StreamErrorKind,
    pub message: String,
    pub remediation: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StopStreamResponse {
    pub success: bool,
    pub ack: bool,
}

fn remediation(kind: StreamErrorKind) -> Vec<&'static str> {
    match kind {
        StreamErrorKind::InvalidSource => vec![
            "Provide a non-empty sourceAddress, e.g. rtmp://host/app/key or srt://host:port",
        ],
        StreamErrorKind::CapabilityUnavailable => vec![
            "Install ffmpeg on the host or set FFMPEG_PATH to an executable ffmpeg binary",
            "The availability check runs once at startup; restart the server after installing",
            "Serverless and sandboxed platforms usually cannot spawn ffmpeg; deploy to a VM or container",
        ],
        StreamErrorKind::ProcessStartFailure => vec![
            "Check that the source address is reachable from the server",
            "Verify the protocol, credentials and stream key in the source address",
            "Confirm the upstream is actually publishing before starting",
        ],
        StreamErrorKind::ProcessRuntimeFailure => vec![
            "The upstream stopped or became unreachable; start the stream again",
            "Inspect the diagnostics for codec or network errors",
        ],
        StreamErrorKind::Superseded => vec![
            "Another start or stop request replaced this one; check the stream status",
        ],
    }
}

fn status_code(kind: StreamErrorKind) -> StatusCode {
    match kind {
        StreamErrorKind::InvalidSource => StatusCode::BAD_REQUEST,
        StreamErrorKind::CapabilityUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        StreamErrorKind::ProcessStartFailure | StreamErrorKind::ProcessRuntimeFailure => {
            StatusCode::BAD_GATEWAY
        }
        StreamErrorKind::Superseded => StatusCode::CONFLICT,
    }
}

impl From<StreamError> for StreamErrorResponse {
    fn from(err: StreamError) -> Self {
        let kind = err.kind();
        Self {
            success: false,
            error_kind: kind,
            message: err.to_string(),
            remediation: remediation(kind),
            exit_code: err.exit_code(),
            diagnostics: err.diagnostics().to_vec(),
        }
    }
}

/// Start transcoding a source into the HLS directory
async fn start_stream(
    State(state): State<AppState>,
    Json(body): Json<StartStreamRequest>,
) -> Result<Json<StartStreamResponse>, (StatusCode, Json<StreamErrorResponse>)> {
    match state.stream.start_stream(&body.source_address).await {
        Ok(started) => Ok(Json(StartStreamResponse {
            success: true,
            playlist_url: started.playlist_url,
            source_address: started.source_address,
            mode: "hls",
        })),
        Err(err) => {
            tracing::warn!(error_kind = ?err.kind(), error = %err, "Stream start failed");
            Err((status_code(err.kind()), Json(err.into())))
        }
    }
}

/// Stop the stream and purge its files. Always acknowledges.
async fn stop_stream(State(state): State<AppState>) -> Json<StopStreamResponse> {
    state.stream.stop_stream().await;
    Json(StopStreamResponse {
        success: true,
        ack: true,
    })
}

async fn stream_status(State(state): State<AppState>) -> Json<StreamStatus> {
    Json(state.stream.status().await)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stream/start", post(start_stream))
        .route("/stream/stop", post(stop_stream))
        .route("/stream/status", get(stream_status))
}
