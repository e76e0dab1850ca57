use regex::Regex;
use std::sync::LazyLock;

use crate::error::ApiError;

const MAX_SQL_BYTES: usize = 50 * 1024;

const ALLOWED_KEYWORDS: &[&str] = &["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];
const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
];
const FENCED_FUNCTIONS: &[&str] = &["file", "url", "jdbc", "odbc", "mysql", "postgresql"];

static PARAM_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,64}$").unwrap());

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub warnings: Vec<String>,
}

/// Guards the execution surface before any rewrite happens. Stateless and
/// pure: same input always produces the same verdict.
pub struct SqlValidator;

impl SqlValidator {
    pub fn validate(sql: &str) -> Result<ValidationOutcome, ApiError> {
        if sql.trim().is_empty() {
            return Err(ApiError::Validation("query must not be empty".into()));
        }
        if sql.len() > MAX_SQL_BYTES {
            return Err(ApiError::Validation("query exceeds maximum length".into()));
        }

        let stripped = strip_comments(sql);
        let masked = mask_string_literals(&stripped);
        let upper = masked.to_uppercase();

        reject_multiple_statements(&stripped)?;

        let first_keyword = upper
            .split_whitespace()
            .next()
            .ok_or_else(|| ApiError::Validation("query has no statement".into()))?;

        if first_keyword == "WITH" {
            let trailing = trailing_statement_keyword(&upper)
                .ok_or_else(|| ApiError::Validation("WITH clause missing a trailing statement".into()))?;
            if !ALLOWED_KEYWORDS.contains(&trailing.as_str()) {
                return Err(ApiError::Validation(format!(
                    "statement kind not allowed: {trailing}"
                )));
            }
        } else if !ALLOWED_KEYWORDS.contains(&first_keyword) {
            return Err(ApiError::Validation(format!(
                "statement kind not allowed: {first_keyword}"
            )));
        }

        for kw in DENIED_KEYWORDS {
            if contains_keyword(&upper, kw) {
                return Err(ApiError::Validation(format!("disallowed keyword: {kw}")));
            }
        }

        if contains_keyword(&upper, "UNION") {
            return Err(ApiError::Validation("UNION is not allowed".into()));
        }

        for func in FENCED_FUNCTIONS {
            if upper.contains(&format!("{}(", func.to_uppercase())) {
                return Err(ApiError::Validation(format!("function not allowed: {func}")));
            }
        }

        for (name, _) in extract_named_parameters(&stripped) {
            if !PARAM_NAME_RE.is_match(&name) {
                return Err(ApiError::Validation(format!("invalid parameter name: {name}")));
            }
        }

        let has_limit = contains_keyword(&upper, "LIMIT");
        let has_aggregate = ["COUNT", "SUM", "AVG", "MIN", "MAX", "GROUP BY", "HAVING"]
            .iter()
            .any(|kw| upper.contains(kw));
        let targets_logs = upper.contains("LOGS");

        if targets_logs && !has_limit && !has_aggregate {
            return Err(ApiError::Validation(
                "queries on logs must include LIMIT".into(),
            ));
        }

        let mut warnings = Vec::new();
        if targets_logs && !upper.contains("TIMESTAMP") {
            warnings.push("query has no predicate on timestamp".to_string());
        }

        Ok(ValidationOutcome { warnings })
    }
}

fn reject_multiple_statements(sql: &str) -> Result<(), ApiError> {
    let mut in_string = false;
    let mut quote = '\'';
    let chars: Vec<char> = sql.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if c == quote && chars.get(i.wrapping_sub(1)) != Some(&'\\') {
                in_string = false;
            }
            continue;
        }
        if c == '\'' || c == '"' {
            in_string = true;
            quote = c;
            continue;
        }
        if c == ';' {
            let rest: String = chars[i + 1..].iter().collect();
            if !rest.trim().is_empty() {
                return Err(ApiError::Validation("multiple statements are not allowed".into()));
            }
        }
    }
    Ok(())
}

fn contains_keyword(upper_sql: &str, keyword: &str) -> bool {
    let bytes = upper_sql.as_bytes();
    let kw = keyword.as_bytes();
    let mut start = 0;
    while let Some(pos) = find_from(bytes, kw, start) {
        let before_ok = pos == 0 || !bytes[pos - 1].is_ascii_alphanumeric() && bytes[pos - 1] != b'_';
        let after = pos + kw.len();
        let after_ok = after >= bytes.len() || !bytes[after].is_ascii_alphanumeric() && bytes[after] != b'_';
        if before_ok && after_ok {
            return true;
        }
        start = pos + 1;
    }
    false
}

fn find_from(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if start >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + start)
}

fn trailing_statement_keyword(upper_sql: &str) -> Option<String> {
    // Find the last top-level `)` that closes the CTE list, then read the
    // first keyword after it. A simplified but string-safe scan: walk
    // paren depth and note the keyword following depth returning to zero
    // after a comma-free close, outside of strings (comments already
    // stripped by the caller).
    let mut depth: i32 = 0;
    let mut last_zero_close: Option<usize> = None;
    for (i, c) in upper_sql.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    last_zero_close = Some(i);
                }
            }
            _ => {}
        }
    }
    let from = last_zero_close.map(|i| i + 1).unwrap_or(0);
    upper_sql[from..].split_whitespace().find(|w| !w.is_empty()).map(|s| s.to_string())
}

/// Blank out the contents of string literals (quotes kept, interior chars
/// replaced with spaces) so keyword/function scans never match text that
/// only appears inside a quoted value.
fn mask_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;
    let mut quote = '\'';
    while let Some(c) = chars.next() {
        if in_string {
            if c == quote {
                in_string = false;
                out.push(c);
            } else {
                out.push(' ');
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                in_string = true;
                quote = c;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;
    let mut quote = '\'';
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == quote {
                in_string = false;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                in_string = true;
                quote = c;
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                while let Some(n) = chars.next() {
                    if n == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Scan `sql` for `:name` / `${name}` placeholders, string-safe.
pub fn extract_named_parameters(sql: &str) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    let bytes = sql.as_bytes();
    let mut in_string = false;
    let mut quote = b'\'';
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            if c == quote {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' => {
                in_string = true;
                quote = c;
                i += 1;
            }
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let start = i + 2;
                if let Some(end) = sql[start..].find('}') {
                    let name = &sql[start..start + end];
                    out.push((name.to_string(), i));
                    i = start + end + 1;
                } else {
                    i += 1;
                }
            }
            b':' if bytes.get(i + 1).map(|b| b.is_ascii_alphanumeric() || *b == b'_').unwrap_or(false) => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                out.push((sql[start..end].to_string(), i));
                i = end;
            }
            _ => i += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_select_with_limit() {
        assert!(SqlValidator::validate("SELECT * FROM logs WHERE timestamp > now() LIMIT 10").is_ok());
    }

    #[test]
    fn rejects_insert() {
        assert!(SqlValidator::validate("INSERT INTO logs VALUES (1)").is_err());
    }

    #[test]
    fn rejects_missing_limit_on_logs() {
        assert!(SqlValidator::validate("SELECT * FROM logs").is_err());
    }

    #[test]
    fn allows_aggregate_without_limit() {
        assert!(SqlValidator::validate("SELECT count() FROM logs").is_ok());
    }

    #[test]
    fn rejects_multiple_statements() {
        assert!(SqlValidator::validate("SELECT 1; DROP TABLE logs").is_err());
    }

    #[test]
    fn rejects_semicolon_inside_string() {
        assert!(SqlValidator::validate("SELECT * FROM logs WHERE message = 'a;b' LIMIT 1").is_ok());
    }

    #[test]
    fn rejects_invalid_parameter_name() {
        assert!(SqlValidator::validate("SELECT * FROM logs WHERE service = :bad-name LIMIT 1").is_err());
    }

    #[test]
    fn allows_denied_keywords_inside_string_literals() {
        assert!(SqlValidator::validate("SELECT * FROM logs WHERE message LIKE '%insert%' LIMIT 5").is_ok());
        assert!(SqlValidator::validate("SELECT * FROM logs WHERE message = 'update failed, delete retried' LIMIT 5").is_ok());
        assert!(SqlValidator::validate("SELECT * FROM logs WHERE message = 'union of shards' LIMIT 5").is_ok());
    }
}
