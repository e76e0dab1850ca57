use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use std::sync::Arc;

use crate::ingest::bus::TailBus;
use crate::ingest::committer::BatchCommitter;
use crate::models::log::LogRecord;
use crate::trace_correlator::TraceCorrelator;

const IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accept newline-delimited JSON (or plain text) log lines. One task per
/// connection, matching axum's own per-connection task model.
pub async fn spawn_tcp_acceptor(
    port: u16,
    committer: BatchCommitter,
    bus: TailBus,
    trace_correlator: Arc<TraceCorrelator>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("tcp ingest listening on :{port}");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    let committer = committer.clone();
                    let bus = bus.clone();
                    let trace_correlator = trace_correlator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, committer, bus, trace_correlator).await {
                            tracing::debug!("tcp ingest: connection from {addr} closed: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("tcp ingest: accept failed: {e}");
                }
            }
        }
    });
    Ok(())
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    committer: BatchCommitter,
    bus: TailBus,
    trace_correlator: Arc<TraceCorrelator>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::time::timeout(IDLE_TIMEOUT, lines.next_line()).await??;
        let Some(line) = line else { break };
        if line.len() > MAX_LINE_BYTES {
            continue;
        }
        let record = parse_line(&line).normalize();
        trace_correlator.ingest(&record);
        bus.publish(&record);
        committer.submit(record).await;
        writer.write_all(b"OK\n").await?;
    }
    Ok(())
}

fn parse_line(line: &str) -> LogRecord {
    serde_json::from_str::<LogRecord>(line).unwrap_or_else(|_| LogRecord {
        id: None,
        timestamp: None,
        level: Some("info".to_string()),
        message: line.to_string(),
        service: Some("tcp-client".to_string()),
        trace_id: None,
        span_id: None,
        attributes: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_plain_text_message() {
        let record = parse_line("not json");
        assert_eq!(record.message, "not json");
        assert_eq!(record.service.as_deref(), Some("tcp-client"));
    }

    #[test]
    fn parses_json_line() {
        let record = parse_line(r#"{"message":"hi","level":"WARN"}"#);
        assert_eq!(record.message, "hi");
        assert_eq!(record.level.as_deref(), Some("WARN"));
    }
}
