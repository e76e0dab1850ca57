use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListTracesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_traces(State(state): State<AppState>, Query(q): Query<ListTracesQuery>) -> impl IntoResponse {
    Json(state.trace_correlator.list(q.limit))
}

pub async fn get_trace(State(state): State<AppState>, Path(trace_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    state
        .trace_correlator
        .get(&trace_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("trace {trace_id}")))
}

pub async fn trace_timeline(State(state): State<AppState>, Path(trace_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    state
        .trace_correlator
        .timeline(&trace_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("trace {trace_id}")))
}
