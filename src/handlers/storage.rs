use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::lifecycle;
use crate::schema::TABLE_NAME;

pub async fn storage_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = lifecycle::get_storage_stats(state.store.as_ref(), &state.database)
        .await
        .map_err(|e| ApiError::Store(e.to_string()))?;
    Ok(Json(stats))
}

/// Force a stats refresh by re-querying `system.parts`. ClickHouse has no
/// `ANALYZE TABLE`; this is the closest equivalent the lifecycle manager
/// already runs on its own interval.
pub async fn storage_analyze(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    lifecycle::get_storage_stats(state.store.as_ref(), &state.database)
        .await
        .map_err(|e| ApiError::Store(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn storage_optimize(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let sql = format!("OPTIMIZE TABLE {}.{TABLE_NAME} FINAL", state.database);
    state.store.exec(&sql).await?;
    Ok(StatusCode::ACCEPTED)
}
