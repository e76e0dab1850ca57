pub mod config;
pub mod dashboard_service;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod pagination;
pub mod persistence;
pub mod query_builder;
pub mod query_cache;
pub mod query_engine;
pub mod query_params;
pub mod query_rewriter;
pub mod query_validator;
pub mod saved_query;
pub mod schema;
pub mod store;
pub mod trace_correlator;

use std::sync::Arc;

use ingest::bus::TailBus;
use ingest::committer::BatchCommitter;
use ingest::pipeline::ParserPipeline;
use query_cache::Cache;
use query_engine::QueryEngine;
use store::StoreAdapter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StoreAdapter>,
    pub database: String,
    pub committer: BatchCommitter,
    pub bus: TailBus,
    pub cache: Arc<dyn Cache>,
    pub query_engine: Arc<QueryEngine>,
    pub saved_queries: Arc<saved_query::SavedQueryStore>,
    pub dashboards: Arc<dashboard_service::DashboardService>,
    pub trace_correlator: Arc<trace_correlator::TraceCorrelator>,
    pub parser_pipeline: Arc<ParserPipeline>,
}
