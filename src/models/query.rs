use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_rows() -> u64 {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// A query against the store, routed through validate -> substitute ->
/// rewrite -> paginate -> cache -> execute.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,
    #[serde(default)]
    pub use_cache: bool,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub keyset: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationInfo {
    pub has_more: bool,
    pub next_page_token: Option<String>,
    pub prev_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cache_hit: bool,
    pub optimizations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

impl QueryResponse {
    pub fn error_response(query: &str, error: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
