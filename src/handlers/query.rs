use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::collections::BTreeMap;

use crate::AppState;
use crate::error::ApiError;
use crate::models::builder::{FIELD_REGISTRY, QueryBuilderRequest};
use crate::models::query::QueryRequest;
use crate::models::saved_query::{CreateSavedQueryRequest, ExecuteSavedQueryRequest, SavedQueryFilter, UpdateSavedQueryRequest};
use crate::query_builder::QueryBuilderCompiler;

/// Ad-hoc SQL query. Always 200; domain errors travel in the response body.
pub async fn execute_query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> impl IntoResponse {
    Json(state.query_engine.execute(req).await)
}

pub async fn list_saved_queries(
    State(state): State<AppState>,
    Query(filter): Query<SavedQueryFilter>,
) -> impl IntoResponse {
    Json(state.saved_queries.list(&filter).await)
}

pub async fn create_saved_query(
    State(state): State<AppState>,
    Json(req): Json<CreateSavedQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state.saved_queries.save(req).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_saved_query(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.saved_queries.get(&id).await?))
}

pub async fn update_saved_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSavedQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.saved_queries.update(&id, req).await?))
}

pub async fn delete_saved_query(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    state.saved_queries.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn execute_saved_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ExecuteSavedQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state.saved_queries.get(&id).await?;
    let response = state
        .query_engine
        .execute(QueryRequest {
            query: saved.sql,
            parameters: req.parameters,
            timeout_ms: req.timeout_ms.unwrap_or(30_000),
            max_rows: req.max_rows.unwrap_or(1000),
            use_cache: req.use_cache,
            page_size: None,
            page_token: None,
            sort_by: None,
            sort_order: Default::default(),
            keyset: false,
        })
        .await;
    Ok(Json(response))
}

pub async fn builder_fields() -> impl IntoResponse {
    Json(serde_json::json!({ "fields": FIELD_REGISTRY }))
}

pub async fn builder_sql(Json(req): Json<QueryBuilderRequest>) -> Result<impl IntoResponse, ApiError> {
    let sql = QueryBuilderCompiler::compile(&req)?;
    Ok(Json(serde_json::json!({ "sql": sql })))
}

pub async fn builder_validate(Json(req): Json<QueryBuilderRequest>) -> impl IntoResponse {
    match QueryBuilderCompiler::compile(&req) {
        Ok(sql) => Json(serde_json::json!({ "valid": true, "sql": sql })),
        Err(e) => Json(serde_json::json!({ "valid": false, "error": e.to_string() })),
    }
}

pub async fn builder_execute(State(state): State<AppState>, Json(req): Json<QueryBuilderRequest>) -> Result<impl IntoResponse, ApiError> {
    let sql = QueryBuilderCompiler::compile(&req)?;
    let response = state
        .query_engine
        .execute(QueryRequest {
            query: sql,
            parameters: BTreeMap::new(),
            timeout_ms: 30_000,
            max_rows: req.limit,
            use_cache: false,
            page_size: None,
            page_token: None,
            sort_by: None,
            sort_order: Default::default(),
            keyset: false,
        })
        .await;
    Ok(Json(response))
}
