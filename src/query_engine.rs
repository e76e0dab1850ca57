use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::query::{QueryRequest, QueryResponse};
use crate::pagination::{PaginationPlanner, Plan};
use crate::query_cache::{cache_key, Cache};
use crate::query_params;
use crate::query_rewriter::QueryRewriter;
use crate::query_validator::SqlValidator;
use crate::store::StoreAdapter;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Orchestrates validate -> substitute -> rewrite -> paginate -> execute,
/// consulting the cache up front and populating it afterward. Domain errors
/// never escape as a transport-level error; they travel inside
/// `QueryResponse.error` so the caller always gets a 200.
pub struct QueryEngine {
    store: Arc<dyn StoreAdapter>,
    rewriter: QueryRewriter,
    cache: Option<Arc<dyn Cache>>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn StoreAdapter>, cache: Option<Arc<dyn Cache>>) -> Self {
        Self { store, rewriter: QueryRewriter::default(), cache }
    }

    pub async fn execute(&self, req: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let key = cache_key(&req.query, &req.parameters);

        if req.use_cache {
            if let Some(cache) = &self.cache {
                if let Some(mut cached) = cache.get(&key) {
                    cached.cache_hit = true;
                    cached.execution_time_ms = started.elapsed().as_millis() as u64;
                    return cached;
                }
            }
        }

        let outcome = match SqlValidator::validate(&req.query) {
            Ok(o) => o,
            Err(e) => return QueryResponse::error_response(&req.query, e.to_string()),
        };
        for warning in &outcome.warnings {
            tracing::warn!("query engine: {warning}: {}", req.query);
        }

        let substituted = query_params::substitute(&req.query, &req.parameters);
        let (rewritten, optimizations) = self.rewriter.rewrite(&substituted);

        let plan = match PaginationPlanner::plan(&req) {
            Ok(p) => p,
            Err(e) => return QueryResponse::error_response(&req.query, e.to_string()),
        };

        let final_sql = match &plan {
            Plan::None => {
                if req.max_rows > 0 && !rewritten.to_uppercase().contains("LIMIT") {
                    PaginationPlanner::append_default_limit(&rewritten, req.max_rows)
                } else {
                    rewritten
                }
            }
            _ => PaginationPlanner::apply(&plan, &rewritten),
        };

        let timeout = if req.timeout_ms > 0 {
            Duration::from_millis(req.timeout_ms)
        } else {
            DEFAULT_TIMEOUT
        };

        let result = tokio::time::timeout(timeout, self.store.query(&final_sql)).await;

        let (columns, rows) = match result {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return QueryResponse::error_response(&req.query, e.to_string()),
            Err(_) => return QueryResponse::error_response(&req.query, "query timed out"),
        };

        let key_field = req.sort_by.as_deref();
        let json_rows: Vec<serde_json::Value> = rows
            .into_iter()
            .map(|row| {
                serde_json::Value::Object(
                    row.into_iter().map(|(k, v)| (k, v.into())).collect(),
                )
            })
            .collect();

        let row_count = json_rows.len();
        let pagination = PaginationPlanner::build_info(&plan, row_count, &json_rows, key_field);

        let display_rows: Vec<serde_json::Value> = match &plan {
            Plan::Offset { page_size, .. } | Plan::Keyset { page_size, .. } => {
                json_rows.into_iter().take(*page_size as usize).collect()
            }
            Plan::None => json_rows,
        };

        let mut response = QueryResponse {
            columns,
            row_count: display_rows.len(),
            rows: display_rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
            query: req.query.clone(),
            error: None,
            cache_hit: false,
            optimizations,
            pagination,
        };

        if req.use_cache {
            if let Some(cache) = &self.cache {
                cache.set(key, response.clone(), DEFAULT_CACHE_TTL);
            }
        }

        response.execution_time_ms = started.elapsed().as_millis() as u64;
        response
    }
}
