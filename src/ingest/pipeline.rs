use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use regex::Regex;

use crate::models::log::LogRecord;

/// Ordered, best-effort extraction of structured fields out of an untyped
/// `message`. JSON is tried first, then a small catalog of regexes.
/// Parsed fields only fill in what the original record left blank.
#[derive(Default)]
pub struct ParserPipeline {
    attempts: AtomicU64,
    successes: AtomicU64,
    json_hits: AtomicU64,
    regex_hits: AtomicU64,
}

static KV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?P<key>\w+)=(?:"(?P<qval>[^"]*)"|(?P<val>\S+))"#).unwrap());

impl ParserPipeline {
    pub fn apply(&self, mut record: LogRecord) -> LogRecord {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(&record.message) {
            self.successes.fetch_add(1, Ordering::Relaxed);
            self.json_hits.fetch_add(1, Ordering::Relaxed);
            for (k, v) in obj {
                let value = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                record.attributes.entry(k).or_insert(value);
            }
            return record;
        }

        let mut matched = false;
        for caps in KV_RE.captures_iter(&record.message) {
            matched = true;
            let key = caps["key"].to_string();
            let value = caps.name("qval").or_else(|| caps.name("val")).map(|m| m.as_str().to_string()).unwrap_or_default();
            record.attributes.entry(key).or_insert(value);
        }
        if matched {
            self.successes.fetch_add(1, Ordering::Relaxed);
            self.regex_hits.fetch_add(1, Ordering::Relaxed);
        }

        record
    }

    pub fn stats(&self) -> ParserStats {
        ParserStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            json_hits: self.json_hits.load(Ordering::Relaxed),
            regex_hits: self.regex_hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct ParserStats {
    pub attempts: u64,
    pub successes: u64,
    pub json_hits: u64,
    pub regex_hits: u64,
}

/// Rule-based rejection of malformed records before they reach the
/// committer queue.
pub struct ValidatorPipeline;

#[derive(Debug)]
pub struct IngestValidationError(pub String);

impl ValidatorPipeline {
    pub fn validate(record: &LogRecord) -> Result<(), IngestValidationError> {
        if record.message.is_empty() {
            return Err(IngestValidationError("message must not be empty".to_string()));
        }
        if let Some(ts) = record.timestamp {
            if ts > chrono::Utc::now() + chrono::Duration::seconds(1) {
                return Err(IngestValidationError("timestamp is in the future".to_string()));
            }
        }
        if let Some(level) = &record.level {
            if !crate::models::log::LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(IngestValidationError(format!("unknown level: {level}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_message_fields() {
        let pipeline = ParserPipeline::default();
        let record = LogRecord {
            id: None, timestamp: None, level: None,
            message: r#"{"path":"/health","status":200}"#.to_string(),
            service: None, trace_id: None, span_id: None, attributes: Default::default(),
        };
        let parsed = pipeline.apply(record);
        assert_eq!(parsed.attributes.get("path").unwrap(), "/health");
        assert_eq!(pipeline.stats().json_hits, 1);
    }

    #[test]
    fn extracts_key_value_pairs() {
        let pipeline = ParserPipeline::default();
        let record = LogRecord {
            id: None, timestamp: None, level: None,
            message: r#"method=GET path="/api/v1" status=200"#.to_string(),
            service: None, trace_id: None, span_id: None, attributes: Default::default(),
        };
        let parsed = pipeline.apply(record);
        assert_eq!(parsed.attributes.get("method").unwrap(), "GET");
        assert_eq!(parsed.attributes.get("path").unwrap(), "/api/v1");
    }

    #[test]
    fn rejects_empty_message() {
        let record = LogRecord {
            id: None, timestamp: None, level: None, message: String::new(),
            service: None, trace_id: None, span_id: None, attributes: Default::default(),
        };
        assert!(ValidatorPipeline::validate(&record).is_err());
    }
}
