use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanLog {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub service: String,
    #[serde(default)]
    pub operation: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub status: SpanStatus,
    #[serde(default)]
    pub logs: Vec<SpanLog>,
    #[serde(skip_deserializing, default)]
    pub children: Vec<Span>,
    #[serde(default)]
    pub attributes: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub trace_id: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub duration_ms: i64,
    pub services: BTreeSet<String>,
    pub error_count: u64,
    #[serde(skip)]
    pub spans: HashMap<String, Span>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl Trace {
    pub fn new(trace_id: String, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            trace_id,
            start_time: now,
            end_time: now,
            duration_ms: 0,
            services: BTreeSet::new(),
            error_count: 0,
            spans: HashMap::new(),
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub duration_ms: i64,
    pub services: Vec<String>,
    pub span_count: usize,
    pub error_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceTimeline {
    pub trace_id: String,
    pub root: Option<Span>,
    pub span_count: usize,
}
