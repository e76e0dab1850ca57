use axum::routing::{get, post, put};
use axum::Router;
use clickhouse::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use logdeck::config::{RuntimeConfig, StorageConfig};
use logdeck::dashboard_service::DashboardService;
use logdeck::ingest::bus::TailBus;
use logdeck::ingest::pipeline::ParserPipeline;
use logdeck::ingest::{committer, tcp, udp};
use logdeck::query_cache::{spawn_cache_sweeper, Cache, MokaQueryCache};
use logdeck::query_engine::QueryEngine;
use logdeck::saved_query::SavedQueryStore;
use logdeck::store::{ClickHouseStore, StoreAdapter};
use logdeck::trace_correlator::{spawn_evictor, TraceCorrelator};
use logdeck::{handlers, lifecycle, schema, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logdeck=debug,tower_http=debug")))
        .init();

    let runtime_config = RuntimeConfig::from_env();
    let storage_config = StorageConfig::load("logdeck.toml")?;

    let ch = Client::default()
        .with_url(&runtime_config.clickhouse_url)
        .with_database(&runtime_config.clickhouse_database)
        .with_user(&runtime_config.clickhouse_user)
        .with_password(&runtime_config.clickhouse_password);

    let store: Arc<dyn StoreAdapter> = Arc::new(ClickHouseStore::new(ch));

    let schema_manager = schema::SchemaManager::new(
        store.as_ref(),
        storage_config.clone(),
        runtime_config.clickhouse_database.clone(),
    );
    schema_manager.ensure_schema().await?;

    lifecycle::spawn_lifecycle_manager(store.clone(), storage_config.clone(), runtime_config.clickhouse_database.clone());

    let cache = Arc::new(MokaQueryCache::new(1000));
    spawn_cache_sweeper(cache.clone());
    let cache_trait: Arc<dyn Cache> = cache;

    let query_engine = Arc::new(QueryEngine::new(store.clone(), Some(cache_trait.clone())));

    let saved_queries = Arc::new(SavedQueryStore::new());
    saved_queries.seed_builtins().await;

    let dashboards = Arc::new(DashboardService::new(saved_queries.clone(), query_engine.clone()));

    let trace_correlator = Arc::new(TraceCorrelator::default());
    spawn_evictor(trace_correlator.clone());

    let bus = TailBus::default();
    let committer = committer::spawn(store.clone(), committer::CommitterConfig::default());
    tcp::spawn_tcp_acceptor(runtime_config.tcp_ingest_port, committer.clone(), bus.clone(), trace_correlator.clone()).await?;
    udp::spawn_udp_acceptor(runtime_config.udp_ingest_port, committer.clone(), bus.clone(), trace_correlator.clone()).await?;

    let parser_pipeline = Arc::new(ParserPipeline::default());

    let state = AppState {
        store,
        database: runtime_config.clickhouse_database.clone(),
        committer,
        bus,
        cache: cache_trait,
        query_engine,
        saved_queries,
        dashboards,
        trace_correlator,
        parser_pipeline,
    };

    let app = Router::new()
        .route("/ingest", post(handlers::ingest::ingest))
        .route("/ingest/bulk", post(handlers::ingest::ingest_bulk))
        .route("/api/v1/query", post(handlers::query::execute_query))
        .route(
            "/api/v1/saved-queries",
            get(handlers::query::list_saved_queries).post(handlers::query::create_saved_query),
        )
        .route(
            "/api/v1/saved-queries/{id}",
            get(handlers::query::get_saved_query)
                .put(handlers::query::update_saved_query)
                .delete(handlers::query::delete_saved_query),
        )
        .route(
            "/api/v1/saved-queries/{id}/execute",
            post(handlers::query::execute_saved_query),
        )
        .route("/api/v1/query-builder/fields", get(handlers::query::builder_fields))
        .route("/api/v1/query-builder/sql", post(handlers::query::builder_sql))
        .route("/api/v1/query-builder/validate", post(handlers::query::builder_validate))
        .route("/api/v1/query-builder/execute", post(handlers::query::builder_execute))
        .route(
            "/api/v1/dashboards",
            get(handlers::dashboards::list_dashboards).post(handlers::dashboards::create_dashboard),
        )
        .route(
            "/api/v1/dashboards/{id}",
            get(handlers::dashboards::get_dashboard)
                .put(handlers::dashboards::update_dashboard)
                .delete(handlers::dashboards::delete_dashboard),
        )
        .route(
            "/api/v1/dashboards/{id}/widgets",
            post(handlers::dashboards::create_widget),
        )
        .route(
            "/api/v1/dashboards/{id}/widgets/{wid}",
            put(handlers::dashboards::update_widget).delete(handlers::dashboards::delete_widget),
        )
        .route(
            "/api/v1/dashboards/{id}/widgets/{wid}/execute",
            get(handlers::dashboards::execute_widget),
        )
        .route("/api/v1/dashboards/{id}/data", get(handlers::dashboards::dashboard_data))
        .route("/api/v1/dashboards/{id}/share", post(handlers::dashboards::share_dashboard))
        .route("/shared/{token}", get(handlers::dashboards::get_shared_dashboard))
        .route("/api/v1/traces", get(handlers::traces::list_traces))
        .route("/api/v1/traces/{trace_id}", get(handlers::traces::get_trace))
        .route("/api/v1/traces/{trace_id}/timeline", get(handlers::traces::trace_timeline))
        .route("/api/v1/storage/stats", get(handlers::storage::storage_stats))
        .route("/api/v1/storage/analyze", post(handlers::storage::storage_analyze))
        .route("/api/v1/storage/optimize", post(handlers::storage::storage_optimize))
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime_config.bind_port));
    tracing::info!("logdeck listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
