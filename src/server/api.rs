use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coding_agent::runtime::{ControlCommand, SessionError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::server::ServerState;

/// Error body: `{"status": "error", "message": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: StatusBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusBody {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: StatusBody {
                status: "error".to_string(),
                message: Some(message.into()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendMessageRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ControlRequest {
    pub session_id: String,
    pub command: String,
}

pub(crate) async fn send_message(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<StatusBody>, ApiError> {
    let Json(request) = payload?;
    state
        .copilot
        .arbiter()
        .submit(&request.session_id, &request.message)?;
    info!(session_id = request.session_id.trim(), "message queued");
    Ok(Json(StatusBody::success()))
}

pub(crate) async fn control(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<Json<StatusBody>, ApiError> {
    let Json(request) = payload?;
    if request.session_id.trim().is_empty() {
        return Err(SessionError::EmptySessionId.into());
    }
    match ControlCommand::parse(&request.command)? {
        ControlCommand::Stop => state.copilot.arbiter().post_stop(&request.session_id)?,
    }
    Ok(Json(StatusBody::success()))
}
