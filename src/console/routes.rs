//! Console API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ConsoleState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::engine::commands::{Dispatcher, IncomingMessage, Reply};
use crate::engine::house::HouseStatus;
use crate::types::{BetSummary, EngineError, Participant, RoundResult};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ConsoleState {
    pub dispatcher: Dispatcher,
    pub results_limit: usize,
}

impl ConsoleState {
    pub fn new(dispatcher: Dispatcher, results_limit: usize) -> Self {
        Self { dispatcher, results_limit }
    }
}

pub type AppState = Arc<ConsoleState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Engine failure surfaced as a JSON error body.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::StorageUnavailable(e) => {
                error!(error = %e, "Console request failed on store");
                StatusCode::SERVICE_UNAVAILABLE
            }
            EngineError::UnknownParticipant(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::CONFLICT,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /api/messages
pub async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<IncomingMessage>,
) -> Json<Reply> {
    Json(state.dispatcher.handle(&message).await)
}

/// GET /api/round
pub async fn get_round(State(state): State<AppState>) -> ApiResult<HouseStatus> {
    Ok(Json(state.dispatcher.house().status().await?))
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub limit: Option<usize>,
}

/// GET /api/results
pub async fn get_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult<Vec<RoundResult>> {
    let limit = query.limit.unwrap_or(state.results_limit);
    Ok(Json(state.dispatcher.house().list_recent_results(limit).await?))
}

/// GET /api/participants
pub async fn get_participants(State(state): State<AppState>) -> ApiResult<Vec<Participant>> {
    Ok(Json(state.dispatcher.house().list_participants().await?))
}

/// GET /api/bets (active round only, empty when idle)
pub async fn get_bets(State(state): State<AppState>) -> ApiResult<Vec<BetSummary>> {
    let house = state.dispatcher.house();
    let summary = match house.status().await?.round_id {
        Some(round_id) => house.list_open_bets_summary(round_id).await?,
        None => Vec::new(),
    };
    Ok(Json(summary))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
