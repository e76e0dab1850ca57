use std::sync::LazyLock;
use chrono::Datelike;
use regex::Regex;
use std::sync::Arc;
use tokio::net::UdpSocket;

use crate::ingest::bus::TailBus;
use crate::ingest::committer::BatchCommitter;
use crate::models::log::{normalize_level, LogRecord};
use crate::trace_correlator::TraceCorrelator;

const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

/// Accept one syslog datagram per packet. RFC5424 first, then RFC3164, then
/// a permissive fallback. No ack is sent (UDP, fire-and-forget).
pub async fn spawn_udp_acceptor(
    port: u16,
    committer: BatchCommitter,
    bus: TailBus,
    trace_correlator: Arc<TraceCorrelator>,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    tracing::info!("udp ingest listening on :{port}");
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let datagram = String::from_utf8_lossy(&buf[..len]);
                    let mut record = parse_syslog(&datagram).normalize();
                    record.attributes.insert("source_addr".to_string(), addr.to_string());
                    trace_correlator.ingest(&record);
                    bus.publish(&record);
                    committer.submit(record).await;
                }
                Err(e) => {
                    tracing::warn!("udp ingest: recv failed: {e}");
                }
            }
        }
    });
    Ok(())
}

struct Priority {
    facility: u8,
    severity: u8,
}

fn parse_priority(s: &str) -> Option<(Priority, &str)> {
    let rest = s.strip_prefix('<')?;
    let end = rest.find('>')?;
    let value: u8 = rest[..end].parse().ok()?;
    Some((Priority { facility: value >> 3, severity: value & 0x7 }, &rest[end + 1..]))
}

fn severity_to_level(severity: u8) -> &'static str {
    match severity {
        0 | 1 | 2 => "fatal",
        3 => "error",
        4 => "warn",
        5 | 6 => "info",
        _ => "debug",
    }
}

static RFC5424_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<version>\d+)\s+(?P<timestamp>\S+)\s+(?P<host>\S+)\s+(?P<app>\S+)\s+(?P<pid>\S+)\s+(?P<msgid>\S+)\s+(?P<sd>(?:\[.*?\]|-))\s*(?P<msg>.*)$").unwrap()
});

static RFC3164_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<timestamp>\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<host>\S+)\s+(?P<tag>[^:]+):\s*(?P<msg>.*)$").unwrap()
});

fn parse_syslog(datagram: &str) -> LogRecord {
    let datagram = datagram.trim_end();
    let (priority, rest) = match parse_priority(datagram) {
        Some(v) => v,
        None => return fallback(datagram),
    };
    let level = severity_to_level(priority.severity).to_string();

    if let Some(caps) = RFC5424_RE.captures(rest) {
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("facility".to_string(), priority.facility.to_string());
        attributes.insert("app".to_string(), caps["app"].to_string());
        attributes.insert("host".to_string(), caps["host"].to_string());
        let timestamp = chrono::DateTime::parse_from_rfc3339(&caps["timestamp"])
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc));
        return LogRecord {
            id: None,
            timestamp,
            level: Some(level),
            message: caps["msg"].to_string(),
            service: Some(caps["app"].to_string()),
            trace_id: None,
            span_id: None,
            attributes,
        };
    }

    if let Some(caps) = RFC3164_RE.captures(rest) {
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("facility".to_string(), priority.facility.to_string());
        attributes.insert("host".to_string(), caps["host"].to_string());
        return LogRecord {
            id: None,
            timestamp: parse_rfc3164_timestamp(&caps["timestamp"]),
            level: Some(level),
            message: caps["msg"].to_string(),
            service: Some(caps["tag"].trim().to_string()),
            trace_id: None,
            span_id: None,
            attributes,
        };
    }

    LogRecord {
        id: None,
        timestamp: None,
        level: Some(level),
        message: rest.to_string(),
        service: Some("syslog".to_string()),
        trace_id: None,
        span_id: None,
        attributes: Default::default(),
    }
}

/// RFC3164 timestamps carry no year. Attach the current wall-clock year,
/// rolling back one year if that would place the message in the future by
/// more than a day (the New Year edge case: a Dec 31 message received on
/// Jan 1).
fn parse_rfc3164_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let now = chrono::Utc::now();
    let with_year = format!("{} {}", now.format("%Y"), raw.split_whitespace().collect::<Vec<_>>().join(" "));
    let parsed = chrono::NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S").ok()?;
    let candidate = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(parsed, chrono::Utc);
    if candidate > now + chrono::Duration::days(1) {
        let prior_year = format!("{} {}", now.year() - 1, raw.split_whitespace().collect::<Vec<_>>().join(" "));
        let parsed = chrono::NaiveDateTime::parse_from_str(&prior_year, "%Y %b %e %H:%M:%S").ok()?;
        return Some(chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(parsed, chrono::Utc));
    }
    Some(candidate)
}

fn fallback(datagram: &str) -> LogRecord {
    LogRecord {
        id: None,
        timestamp: None,
        level: Some(normalize_level(None)),
        message: datagram.to_string(),
        service: Some("syslog".to_string()),
        trace_id: None,
        span_id: None,
        attributes: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc5424() {
        let datagram = "<34>1 2024-01-15T10:00:00Z host app 123 - - out of memory";
        let record = parse_syslog(datagram);
        assert_eq!(record.level.as_deref(), Some("error"));
        assert_eq!(record.service.as_deref(), Some("app"));
        assert!(record.message.contains("out of memory"));
    }

    #[test]
    fn parses_rfc3164() {
        let datagram = "<13>Jan 15 10:00:00 host sshd[123]: login failed";
        let record = parse_syslog(datagram);
        assert_eq!(record.level.as_deref(), Some("info"));
        assert!(record.message.contains("login failed"));
    }

    #[test]
    fn falls_back_without_priority() {
        let record = parse_syslog("no priority here");
        assert_eq!(record.service.as_deref(), Some("syslog"));
    }
}
