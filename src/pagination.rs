use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::query::{PaginationInfo, QueryRequest, SortOrder};

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Serialize, Deserialize)]
struct OffsetToken {
    offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeysetToken {
    sort_value: serde_json::Value,
}

pub enum Plan {
    None,
    Offset { page_size: u32, offset: u64 },
    Keyset { page_size: u32, key_field: String, sort_order: SortOrder, sort_value: Option<serde_json::Value> },
}

pub struct PaginationPlanner;

impl PaginationPlanner {
    pub fn plan(req: &QueryRequest) -> Result<Plan, ApiError> {
        let Some(requested_size) = req.page_size else {
            return Ok(Plan::None);
        };
        let page_size = requested_size.clamp(1, MAX_PAGE_SIZE);

        if req.keyset {
            let key_field = req
                .sort_by
                .clone()
                .ok_or_else(|| ApiError::Validation("keyset pagination requires sort_by".into()))?;
            let sort_value = match &req.page_token {
                Some(token) => Some(decode_keyset(token)?.sort_value),
                None => None,
            };
            Ok(Plan::Keyset { page_size, key_field, sort_order: req.sort_order, sort_value })
        } else {
            let offset = match &req.page_token {
                Some(token) => decode_offset(token)?.offset,
                None => 0,
            };
            Ok(Plan::Offset { page_size, offset })
        }
    }

    /// Inject LIMIT/OFFSET (or a keyset WHERE predicate) into `sql`, stripping
    /// any existing LIMIT/OFFSET clause first. A trailing FORMAT clause (if
    /// the rewriter already appended one) is set aside and reattached last,
    /// since ClickHouse requires FORMAT to be the final clause.
    pub fn apply(plan: &Plan, sql: &str) -> String {
        let (body, tail) = split_format_tail(sql);
        let stripped = strip_limit_offset(body);
        let rebuilt = match plan {
            Plan::None => stripped,
            Plan::Offset { page_size, offset } => {
                format!("{stripped} LIMIT {} OFFSET {offset}", page_size + 1)
            }
            Plan::Keyset { page_size, key_field, sort_order, sort_value } => {
                let mut out = stripped;
                if let Some(value) = sort_value {
                    let op = match sort_order {
                        SortOrder::Desc => "<",
                        SortOrder::Asc => ">",
                    };
                    let literal = crate::query_params::format_value(value);
                    let predicate = format!("{key_field} {op} {literal}");
                    out = inject_predicate(&out, &predicate);
                }
                if !out.to_uppercase().contains("ORDER BY") {
                    let dir = match sort_order {
                        SortOrder::Desc => "DESC",
                        SortOrder::Asc => "ASC",
                    };
                    out = format!("{out} ORDER BY {key_field} {dir}");
                }
                format!("{out} LIMIT {}", page_size + 1)
            }
        };
        format!("{rebuilt}{tail}")
    }

    /// Append `LIMIT n` ahead of a trailing FORMAT clause when the caller
    /// didn't request pagination but still set `max_rows`.
    pub fn append_default_limit(sql: &str, limit: u32) -> String {
        let (body, tail) = split_format_tail(sql);
        format!("{} LIMIT {limit}{tail}", body.trim_end())
    }

    pub fn build_info(
        plan: &Plan,
        row_count: usize,
        rows: &[serde_json::Value],
        key_field: Option<&str>,
    ) -> Option<PaginationInfo> {
        match plan {
            Plan::None => None,
            Plan::Offset { page_size, offset } => {
                let has_more = row_count as u32 > *page_size;
                let next = has_more.then(|| encode_offset(offset + *page_size as u64));
                let prev = (*offset > 0).then(|| encode_offset(offset.saturating_sub(*page_size as u64)));
                Some(PaginationInfo { has_more, next_page_token: next, prev_page_token: prev })
            }
            Plan::Keyset { page_size, .. } => {
                let has_more = row_count as u32 > *page_size;
                let next = if has_more {
                    key_field.and_then(|k| {
                        rows.get((*page_size as usize).saturating_sub(1))
                            .and_then(|row| row.get(k))
                            .map(|v| encode_keyset(v.clone()))
                    })
                } else {
                    None
                };
                Some(PaginationInfo { has_more, next_page_token: next, prev_page_token: None })
            }
        }
    }

    pub fn page_size_or_default(req: &QueryRequest) -> u32 {
        req.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

fn encode_offset(offset: u64) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&OffsetToken { offset }).unwrap())
}

fn decode_offset(token: &str) -> Result<OffsetToken, ApiError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| ApiError::Validation("malformed page_token".into()))?;
    serde_json::from_slice(&bytes).map_err(|_| ApiError::Validation("malformed page_token".into()))
}

fn encode_keyset(sort_value: serde_json::Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&KeysetToken { sort_value }).unwrap())
}

fn decode_keyset(token: &str) -> Result<KeysetToken, ApiError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| ApiError::Validation("malformed page_token".into()))?;
    serde_json::from_slice(&bytes).map_err(|_| ApiError::Validation("malformed page_token".into()))
}

/// Split off a trailing ` FORMAT ...` clause so callers can rewrite the
/// query body without disturbing it, then reattach it last.
fn split_format_tail(sql: &str) -> (&str, &str) {
    let upper = sql.to_uppercase();
    match upper.find(" FORMAT ") {
        Some(pos) => (&sql[..pos], &sql[pos..]),
        None => (sql, ""),
    }
}

fn strip_limit_offset(body: &str) -> String {
    let body_upper = body.to_uppercase();
    let limit_pos = body_upper.find(" LIMIT ");
    let trimmed = match limit_pos {
        Some(pos) => &body[..pos],
        None => body,
    };
    trimmed.trim_end().to_string()
}

fn inject_predicate(sql: &str, predicate: &str) -> String {
    let upper = sql.to_uppercase();
    match upper.find(" WHERE ") {
        Some(pos) => {
            let split = pos + " WHERE ".len();
            format!("{} WHERE {predicate} AND {}", &sql[..pos], &sql[split..])
        }
        None => {
            let group_pos = upper.find(" GROUP BY ").or_else(|| upper.find(" ORDER BY "));
            match group_pos {
                Some(pos) => format!("{} WHERE {predicate} {}", &sql[..pos], &sql[pos..]),
                None => format!("{sql} WHERE {predicate}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_round_trips() {
        let token = encode_offset(42);
        assert_eq!(decode_offset(&token).unwrap().offset, 42);
    }

    #[test]
    fn strips_existing_limit_before_reapplying() {
        let sql = "SELECT * FROM logs WHERE service = 'a' LIMIT 5 OFFSET 2";
        let stripped = strip_limit_offset(sql);
        assert!(!stripped.to_uppercase().contains("LIMIT"));
    }

    #[test]
    fn keeps_format_clause_trailing_after_applying_offset() {
        let sql = "SELECT * FROM logs WHERE service = 'a' FORMAT JSONEachRow";
        let applied = PaginationPlanner::apply(&Plan::Offset { page_size: 10, offset: 0 }, sql);
        assert!(applied.ends_with("FORMAT JSONEachRow"));
        assert!(applied.contains("LIMIT 11 OFFSET 0"));
        assert!(applied.find("LIMIT").unwrap() < applied.find("FORMAT").unwrap());
    }

    #[test]
    fn default_limit_inserted_before_format_clause() {
        let sql = "SELECT * FROM logs FORMAT JSONEachRow";
        let applied = PaginationPlanner::append_default_limit(sql, 50);
        assert_eq!(applied, "SELECT * FROM logs LIMIT 50 FORMAT JSONEachRow");
    }
}
