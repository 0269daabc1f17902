//! Inspection endpoints for observability.
//!
//! Everything here is a read-only view of in-memory state; nothing survives a
//! restart.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use super::AppState;
use crate::dispatch::DispatcherState;
use crate::problems::PublishProblem;
use crate::types::BuildTypeId;

/// Body of `GET /api/v1/dispatcher/state`.
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub dispatcher: DispatcherState,
    /// Tasks waiting in the broker, including delayed retries.
    pub pending_tasks: usize,
}

/// Returns dispatcher counters and the retry configuration as JSON.
///
/// ```ignore
/// GET /api/v1/dispatcher/state HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {
///   "node": "main",
///   "order_cache_entries": 12,
///   "pending_tasks": 1,
///   ...
/// }
/// ```
pub async fn state_handler(State(app_state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        dispatcher: app_state.dispatcher().state(),
        pending_tasks: app_state.broker().pending_count(),
    })
}

/// Errors of the problems endpoint.
#[derive(Debug, Error)]
pub enum ProblemsError {
    #[error("invalid build type id: {0:?}")]
    InvalidBuildType(String),
}

impl IntoResponse for ProblemsError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Returns the publishing problems currently reported for a build type.
pub async fn problems_handler(
    State(app_state): State<AppState>,
    Path(build_type): Path<String>,
) -> Result<Json<Vec<PublishProblem>>, ProblemsError> {
    if !is_valid_build_type_id(&build_type) {
        return Err(ProblemsError::InvalidBuildType(build_type));
    }
    Ok(Json(
        app_state
            .problems()
            .problems_for(&BuildTypeId::new(build_type)),
    ))
}

/// Build type external ids are made of ASCII letters, digits and `_`, `-`, `.`.
fn is_valid_build_type_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
