use std::collections::BTreeSet;
use tokio::sync::broadcast;

use crate::models::log::LogRecord;

/// A single tailed record, or a rolled-up summary standing in for a whole
/// bulk-ingest batch so subscribers never see a per-record fan-out storm.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TailMessage {
    Record(LogRecord),
    BulkSummary { count: usize, services: Vec<String> },
}

/// Best-effort publish/subscribe for live-tail clients. Per-subscriber
/// buffer is bounded; a slow subscriber loses records rather than applying
/// backpressure to ingestion.
#[derive(Clone)]
pub struct TailBus {
    tx: broadcast::Sender<TailMessage>,
}

impl TailBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, record: &LogRecord) {
        // Dropping the result: no subscribers is the common case, not an error.
        let _ = self.tx.send(TailMessage::Record(record.clone()));
    }

    /// Publish one rolled-up message for an entire bulk-ingest batch instead
    /// of fanning out a message per record.
    pub fn publish_bulk_summary(&self, records: &[LogRecord]) {
        if records.is_empty() {
            return;
        }
        let services: BTreeSet<String> = records
            .iter()
            .map(|r| r.service.clone().unwrap_or_else(|| "unknown".to_string()))
            .collect();
        let _ = self.tx.send(TailMessage::BulkSummary {
            count: records.len(),
            services: services.into_iter().collect(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TailMessage> {
        self.tx.subscribe()
    }
}

impl Default for TailBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_summary_reports_count_and_distinct_services() {
        let bus = TailBus::default();
        let mut rx = bus.subscribe();
        let records = vec![
            LogRecord { id: None, timestamp: None, level: None, message: "a".into(), service: Some("api".into()), trace_id: None, span_id: None, attributes: Default::default() },
            LogRecord { id: None, timestamp: None, level: None, message: "b".into(), service: Some("api".into()), trace_id: None, span_id: None, attributes: Default::default() },
            LogRecord { id: None, timestamp: None, level: None, message: "c".into(), service: Some("worker".into()), trace_id: None, span_id: None, attributes: Default::default() },
        ];
        bus.publish_bulk_summary(&records);
        match rx.try_recv().unwrap() {
            TailMessage::BulkSummary { count, services } => {
                assert_eq!(count, 3);
                assert_eq!(services, vec!["api".to_string(), "worker".to_string()]);
            }
            TailMessage::Record(_) => panic!("expected a summary message"),
        }
    }
}
