use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const LEVELS: &[&str] = &["debug", "info", "warn", "error", "fatal"];

/// One ingested log fact. `id`/`timestamp` are filled in at ingest time when
/// the caller leaves them blank; a caller-supplied `id` always wins over the
/// server-assigned one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl LogRecord {
    /// Fill in server-side defaults: id, timestamp, normalized level, service.
    /// Clock-skew tolerant: timestamps more than 1s in the future are clamped
    /// to now rather than rejected (the validator pipeline handles rejection
    /// when strict validation is requested).
    pub fn normalize(mut self) -> Self {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4());
        }
        let now = chrono::Utc::now();
        self.timestamp = Some(match self.timestamp {
            Some(ts) if ts <= now + chrono::Duration::seconds(1) => ts,
            Some(_) => now,
            None => now,
        });
        self.level = Some(normalize_level(self.level.as_deref()));
        if self.service.as_deref().map(str::is_empty).unwrap_or(true) {
            self.service = Some("unknown".to_string());
        }
        self
    }
}

pub fn normalize_level(level: Option<&str>) -> String {
    match level.map(str::to_lowercase).as_deref() {
        Some(l) if LEVELS.contains(&l) => l.to_string(),
        _ => "info".to_string(),
    }
}
