use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::ingest::pipeline::ValidatorPipeline;
use crate::models::log::LogRecord;

#[derive(Debug, Deserialize, Default)]
pub struct IngestOptions {
    #[serde(default = "default_true")]
    pub enable_parsing: bool,
    #[serde(default = "default_true")]
    pub enable_validation: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub logs: Option<Vec<LogRecord>>,
    #[serde(default)]
    pub log: Option<LogRecord>,
    #[serde(default)]
    pub options: IngestOptions,
}

#[derive(Debug, Serialize, Default)]
pub struct IngestResponse {
    pub success: bool,
    pub total: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parse_failures: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_failures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsing_stats: Option<crate::ingest::pipeline::ParserStats>,
}

/// Single or batched log ingest. Accepted records are parsed, validated,
/// published to the live-tail bus and handed to the batch committer; the
/// response always reports counts rather than failing the whole request for
/// a handful of bad records.
pub async fn ingest(State(state): State<AppState>, Json(req): Json<IngestRequest>) -> impl IntoResponse {
    let mut records: Vec<LogRecord> = req.log.into_iter().collect();
    records.extend(req.logs.into_iter().flatten());

    let mut validation_failures = Vec::new();
    let mut accepted = 0usize;

    for record in records {
        let mut record = record.normalize();
        if req.options.enable_parsing {
            record = state.parser_pipeline.apply(record);
        }
        if req.options.enable_validation {
            if let Err(e) = ValidatorPipeline::validate(&record) {
                validation_failures.push(e.0);
                continue;
            }
        }
        state.trace_correlator.ingest(&record);
        state.bus.publish(&record);
        state.committer.submit(record).await;
        accepted += 1;
    }

    let response = IngestResponse {
        success: true,
        total: accepted,
        parse_failures: Vec::new(),
        validation_failures,
        parsing_stats: req.options.enable_parsing.then(|| state.parser_pipeline.stats()),
    };
    (StatusCode::OK, Json(response))
}

#[derive(Debug, Serialize)]
pub struct BulkIngestResponse {
    pub status: &'static str,
    pub count: usize,
}

const MAX_BULK_BYTES: usize = 10 * 1024 * 1024;

pub async fn ingest_bulk(State(state): State<AppState>, body: axum::body::Bytes) -> Result<impl IntoResponse, (StatusCode, String)> {
    if body.len() > MAX_BULK_BYTES {
        return Err((StatusCode::PAYLOAD_TOO_LARGE, "bulk ingest body exceeds 10MiB".to_string()));
    }
    let logs: Vec<LogRecord> = serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let count = logs.len();

    let mut accepted = Vec::with_capacity(logs.len());
    for record in logs {
        let record = state.parser_pipeline.apply(record.normalize());
        if ValidatorPipeline::validate(&record).is_ok() {
            state.trace_correlator.ingest(&record);
            accepted.push(record);
        }
    }
    // One summary message per batch rather than fanning out per record,
    // to avoid flooding live-tail subscribers on large bulk requests.
    state.bus.publish_bulk_summary(&accepted);
    for record in accepted {
        state.committer.submit(record).await;
    }

    Ok((StatusCode::ACCEPTED, Json(BulkIngestResponse { status: "accepted", count })))
}
