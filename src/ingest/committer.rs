use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::models::log::LogRecord;
use crate::store::StoreAdapter;

#[derive(Debug, Clone)]
pub struct CommitterConfig {
    pub max_batch: usize,
    pub max_latency: Duration,
    pub max_retries: u32,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self { max_batch: 500, max_latency: Duration::from_secs(2), max_retries: 3 }
    }
}

/// Handle for enqueuing records (non-blocking, fire-and-forget from the
/// acceptor's perspective). The background flusher owns ordering and
/// batching.
#[derive(Clone)]
pub struct BatchCommitter {
    tx: mpsc::Sender<LogRecord>,
}

impl BatchCommitter {
    /// Enqueue a record. Returns false if the queue is full (backpressure
    /// signal for the acceptor to drop or reject).
    pub async fn submit(&self, record: LogRecord) -> bool {
        self.tx.try_send(record).is_ok()
    }
}

/// Spawn the background flusher and return the handle: bounded channel,
/// `tokio::select!` between recv and an interval tick, flush by size or age.
pub fn spawn(store: Arc<dyn StoreAdapter>, config: CommitterConfig) -> BatchCommitter {
    let (tx, rx) = mpsc::channel(config.max_batch * 4);
    tokio::spawn(committer_loop(rx, store, config));
    BatchCommitter { tx }
}

async fn committer_loop(mut rx: mpsc::Receiver<LogRecord>, store: Arc<dyn StoreAdapter>, config: CommitterConfig) {
    let mut buffer: Vec<LogRecord> = Vec::with_capacity(config.max_batch);
    let mut interval = tokio::time::interval(config.max_latency);

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(record) => {
                        buffer.push(record);
                        if buffer.len() >= config.max_batch {
                            let batch = std::mem::take(&mut buffer);
                            flush(&store, batch, &config).await;
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            flush(&store, std::mem::take(&mut buffer), &config).await;
                        }
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                if !buffer.is_empty() {
                    let batch = std::mem::take(&mut buffer);
                    flush(&store, batch, &config).await;
                }
            }
        }
    }
}

async fn flush(store: &Arc<dyn StoreAdapter>, batch: Vec<LogRecord>, config: &CommitterConfig) {
    let sql = build_insert(&batch);
    let mut attempt = 0;
    loop {
        match store.exec(&sql).await {
            Ok(()) => {
                tracing::debug!("batch committer: flushed {} records", batch.len());
                return;
            }
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                tracing::warn!("batch committer: flush failed ({e}), retry {attempt} in {backoff:?}");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                tracing::error!("batch committer: dropping batch of {} records after {attempt} retries: {e}", batch.len());
                return;
            }
        }
    }
}

fn build_insert(batch: &[LogRecord]) -> String {
    let mut values = Vec::with_capacity(batch.len());
    for record in batch {
        let id = record.id.map(|u| u.to_string()).unwrap_or_default();
        let ts = record
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_default();
        let level = record.level.clone().unwrap_or_else(|| "info".to_string());
        let message = escape(&record.message);
        let service = record.service.clone().unwrap_or_default();
        let trace_id = record.trace_id.clone().unwrap_or_default();
        let span_id = record.span_id.clone().unwrap_or_default();
        let attrs = format_map(&record.attributes);

        values.push(format!(
            "('{id}', '{ts}', '{level}', '{message}', '{service}', '{trace_id}', '{span_id}', {attrs})"
        ));
    }

    format!(
        "INSERT INTO logs (id, timestamp, level, message, service, trace_id, span_id, attributes) VALUES {}",
        values.join(", ")
    )
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn format_map(attrs: &std::collections::BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = attrs
        .iter()
        .flat_map(|(k, v)| [format!("'{}'", escape(k)), format!("'{}'", escape(v))])
        .collect();
    format!("map({})", pairs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_insert_with_escaped_values() {
        let mut attrs = std::collections::BTreeMap::new();
        attrs.insert("k".to_string(), "v'v".to_string());
        let record = LogRecord {
            id: Some(uuid::Uuid::nil()),
            timestamp: Some(chrono::Utc::now()),
            level: Some("info".to_string()),
            message: "it's fine".to_string(),
            service: Some("svc".to_string()),
            trace_id: None,
            span_id: None,
            attributes: attrs,
        };
        let sql = build_insert(&[record]);
        assert!(sql.contains("it\\'s fine"));
        assert!(sql.contains("INSERT INTO logs"));
    }
}
