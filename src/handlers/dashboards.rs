use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::models::dashboard::*;

pub async fn list_dashboards(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "dashboards": state.dashboards.list().await }))
}

pub async fn create_dashboard(
    State(state): State<AppState>,
    Json(req): Json<CreateDashboardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let dashboard = state.dashboards.create(req).await?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}

pub async fn get_dashboard(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboards.get(&id).await?))
}

pub async fn update_dashboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDashboardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboards.update(&id, req).await?))
}

pub async fn delete_dashboard(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    state.dashboards.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_widget(
    State(state): State<AppState>,
    Path(dashboard_id): Path<String>,
    Json(req): Json<CreateWidgetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let widget = state.dashboards.add_widget(&dashboard_id, req).await?;
    Ok((StatusCode::CREATED, Json(widget)))
}

pub async fn update_widget(
    State(state): State<AppState>,
    Path((dashboard_id, widget_id)): Path<(String, String)>,
    Json(req): Json<UpdateWidgetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboards.update_widget(&dashboard_id, &widget_id, req).await?))
}

pub async fn delete_widget(
    State(state): State<AppState>,
    Path((dashboard_id, widget_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.dashboards.delete_widget(&dashboard_id, &widget_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn execute_widget(
    State(state): State<AppState>,
    Path((dashboard_id, widget_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboards.evaluate_widget(&dashboard_id, &widget_id).await?))
}

pub async fn dashboard_data(State(state): State<AppState>, Path(dashboard_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboards.evaluate_all(&dashboard_id).await?))
}

pub async fn share_dashboard(
    State(state): State<AppState>,
    Path(dashboard_id): Path<String>,
    Json(req): Json<ShareDashboardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboards.create_share(&dashboard_id, req).await?))
}

pub async fn get_shared_dashboard(State(state): State<AppState>, Path(token): Path<String>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboards.resolve_share(&token).await?))
}
