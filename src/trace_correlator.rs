use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::models::log::LogRecord;
use crate::models::trace::{Span, SpanLog, SpanStatus, Trace, TraceSummary, TraceTimeline};

const EVICT_IDLE_AFTER: chrono::Duration = chrono::Duration::hours(1);
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// In-memory trace/span graph derived from ingested logs. Children links
/// are not maintained incrementally; they're rebuilt lazily at read time by
/// reindexing `span_id -> span`, the same approach used for OTel wide events.
pub struct TraceCorrelator {
    traces: DashMap<String, Trace>,
    spans_seen: AtomicU64,
}

impl Default for TraceCorrelator {
    fn default() -> Self {
        Self { traces: DashMap::new(), spans_seen: AtomicU64::new(0) }
    }
}

impl TraceCorrelator {
    /// Extract correlation ids from a just-ingested record and fold it into
    /// the in-memory trace map. Out-of-order arrival (child before parent)
    /// is tolerated because the tree is rebuilt at read time.
    pub fn ingest(&self, record: &LogRecord) {
        let Some(trace_id) = extract_trace_id(record) else { return };
        let span_id = extract_span_id(record).unwrap_or_else(|| trace_id.clone());
        let parent_id = extract_parent_id(record);

        let now = record.timestamp.unwrap_or_else(chrono::Utc::now);
        let service = record.service.clone().unwrap_or_else(|| "unknown".to_string());
        let level = record.level.clone().unwrap_or_else(|| "info".to_string());
        let status = if level == "error" || level == "fatal" { SpanStatus::Error } else { SpanStatus::Ok };

        let mut entry = self.traces.entry(trace_id.clone()).or_insert_with(|| Trace::new(trace_id.clone(), now));
        entry.start_time = entry.start_time.min(now);
        entry.end_time = entry.end_time.max(now);
        entry.duration_ms = (entry.end_time - entry.start_time).num_milliseconds();
        entry.services.insert(service.clone());
        entry.last_updated = chrono::Utc::now();
        if matches!(status, SpanStatus::Error) {
            entry.error_count += 1;
        }

        let span = entry.spans.entry(span_id.clone()).or_insert_with(|| Span {
            span_id: span_id.clone(),
            trace_id: trace_id.clone(),
            parent_id: parent_id.clone(),
            service: service.clone(),
            operation: record.message.chars().take(80).collect(),
            start_time: now,
            end_time: now,
            status,
            logs: Vec::new(),
            children: Vec::new(),
            attributes: record.attributes.clone(),
        });
        span.start_time = span.start_time.min(now);
        span.end_time = span.end_time.max(now);
        if span.parent_id.is_none() {
            span.parent_id = parent_id;
        }
        if matches!(status, SpanStatus::Error) {
            span.status = SpanStatus::Error;
        }
        span.logs.push(SpanLog { timestamp: now, level, message: record.message.clone() });

        self.spans_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn list(&self, limit: usize) -> Vec<TraceSummary> {
        let mut all: Vec<TraceSummary> = self
            .traces
            .iter()
            .map(|entry| {
                let t = entry.value();
                TraceSummary {
                    trace_id: t.trace_id.clone(),
                    start_time: t.start_time,
                    end_time: t.end_time,
                    duration_ms: t.duration_ms,
                    services: t.services.iter().cloned().collect(),
                    span_count: t.spans.len(),
                    error_count: t.error_count,
                }
            })
            .collect();
        all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        all.truncate(limit);
        all
    }

    pub fn get(&self, trace_id: &str) -> Option<Trace> {
        self.traces.get(trace_id).map(|r| r.value().clone())
    }

    /// Build the parent/child span tree lazily from the flat span map.
    pub fn timeline(&self, trace_id: &str) -> Option<TraceTimeline> {
        let entry = self.traces.get(trace_id)?;
        let trace = entry.value();
        let span_count = trace.spans.len();

        let mut children_map: HashMap<String, Vec<String>> = HashMap::new();
        let mut roots: Vec<String> = Vec::new();
        for span in trace.spans.values() {
            match &span.parent_id {
                Some(parent) if trace.spans.contains_key(parent) => {
                    children_map.entry(parent.clone()).or_default().push(span.span_id.clone());
                }
                _ => roots.push(span.span_id.clone()),
            }
        }

        fn build(id: &str, spans: &HashMap<String, Span>, children: &HashMap<String, Vec<String>>) -> Span {
            let mut node = spans[id].clone();
            if let Some(child_ids) = children.get(id) {
                node.children = child_ids.iter().map(|c| build(c, spans, children)).collect();
                node.children.sort_by(|a, b| a.start_time.cmp(&b.start_time));
            }
            node
        }

        roots.sort_by(|a, b| spans_start(&trace.spans, a).cmp(&spans_start(&trace.spans, b)));
        let root = roots.first().map(|id| build(id, &trace.spans, &children_map));

        Some(TraceTimeline { trace_id: trace_id.to_string(), root, span_count })
    }
}

fn spans_start(spans: &HashMap<String, Span>, id: &str) -> chrono::DateTime<chrono::Utc> {
    spans.get(id).map(|s| s.start_time).unwrap_or_else(chrono::Utc::now)
}

const TRACE_ID_KEYS: &[&str] = &["trace.id", "trace_id", "traceId", "dd.trace_id", "x-amzn-trace-id"];
const SPAN_ID_KEYS: &[&str] = &["span.id", "span_id", "spanId", "dd.span_id"];
const PARENT_ID_KEYS: &[&str] = &["parent.id", "parent_id", "parentId", "dd.parent_id"];

fn extract_trace_id(record: &LogRecord) -> Option<String> {
    if let Some(id) = record.trace_id.as_ref().filter(|s| !s.is_empty()) {
        return Some(id.clone());
    }
    for key in TRACE_ID_KEYS {
        if let Some(v) = record.attributes.get(*key) {
            return Some(v.clone());
        }
    }
    static TRACE_RE: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"trace[_-]?id[=:]\s*([A-Za-z0-9-]{8,})").unwrap());
    TRACE_RE.captures(&record.message).map(|c| c[1].to_string())
}

fn extract_span_id(record: &LogRecord) -> Option<String> {
    if let Some(id) = record.span_id.as_ref().filter(|s| !s.is_empty()) {
        return Some(id.clone());
    }
    SPAN_ID_KEYS.iter().find_map(|k| record.attributes.get(*k).cloned())
}

fn extract_parent_id(record: &LogRecord) -> Option<String> {
    PARENT_ID_KEYS.iter().find_map(|k| record.attributes.get(*k).cloned())
}

pub fn spawn_evictor(correlator: Arc<TraceCorrelator>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            let stale: Vec<String> = correlator
                .traces
                .iter()
                .filter(|e| now - e.value().last_updated > EVICT_IDLE_AFTER)
                .map(|e| e.key().clone())
                .collect();
            for key in &stale {
                correlator.traces.remove(key);
            }
            if !stale.is_empty() {
                tracing::debug!("trace correlator: evicted {} idle traces", stale.len());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(trace: &str, span: &str, parent: Option<&str>, msg: &str) -> LogRecord {
        let mut attributes = BTreeMap::new();
        if let Some(p) = parent {
            attributes.insert("parent_id".to_string(), p.to_string());
        }
        LogRecord {
            id: None,
            timestamp: Some(chrono::Utc::now()),
            level: Some("info".to_string()),
            message: msg.to_string(),
            service: Some("svc".to_string()),
            trace_id: Some(trace.to_string()),
            span_id: Some(span.to_string()),
            attributes,
        }
    }

    #[test]
    fn builds_three_level_tree() {
        let correlator = TraceCorrelator::default();
        correlator.ingest(&record("t1", "a", None, "start"));
        correlator.ingest(&record("t1", "b", Some("a"), "middle"));
        correlator.ingest(&record("t1", "c", Some("b"), "end"));

        let timeline = correlator.timeline("t1").unwrap();
        let root = timeline.root.unwrap();
        assert_eq!(root.span_id, "a");
        assert_eq!(root.children[0].span_id, "b");
        assert_eq!(root.children[0].children[0].span_id, "c");
    }

    #[test]
    fn tolerates_out_of_order_arrival() {
        let correlator = TraceCorrelator::default();
        correlator.ingest(&record("t2", "child", Some("parent"), "child first"));
        correlator.ingest(&record("t2", "parent", None, "parent second"));

        let timeline = correlator.timeline("t2").unwrap();
        assert_eq!(timeline.span_count, 2);
    }
}
