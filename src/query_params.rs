use std::collections::BTreeMap;

/// Substitute `:name` / `${name}` placeholders in `sql` with quoted literals
/// for each value in `params`. Unknown placeholders are left untouched
/// rather than failing — the validator already bounds what a parameter name
/// can look like.
pub fn substitute(sql: &str, params: &BTreeMap<String, serde_json::Value>) -> String {
    let mut out = String::with_capacity(sql.len());
    let bytes = sql.as_bytes();
    let mut in_string = false;
    let mut quote = b'\'';
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            out.push(c as char);
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
                out.push(c as char);
                i += 1;
            }
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let start = i + 2;
                if let Some(end) = sql[start..].find('}') {
                    let name = &sql[start..start + end];
                    match params.get(name) {
                        Some(v) => out.push_str(&format_value(v)),
                        None => out.push_str(&sql[i..start + end + 1]),
                    }
                    i = start + end + 1;
                } else {
                    out.push(c as char);
                    i += 1;
                }
            }
            b':' if bytes.get(i + 1).map(|b| b.is_ascii_alphanumeric() || *b == b'_').unwrap_or(false) => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                let name = &sql[start..end];
                match params.get(name) {
                    Some(v) => out.push_str(&format_value(v)),
                    None => out.push_str(&sql[i..end]),
                }
                i = end;
            }
            _ => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    out
}

pub fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => {
            if looks_like_timestamp(s) {
                format!("'{}'", s.replace('\'', "''"))
            } else {
                format!("'{}'", s.replace('\'', "''"))
            }
        }
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            let encoded = serde_json::to_string(value).unwrap_or_default();
            format!("'{}'", encoded.replace('\'', "''"))
        }
    }
}

fn looks_like_timestamp(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_colon_and_brace_placeholders() {
        let mut params = BTreeMap::new();
        params.insert("svc".to_string(), serde_json::json!("checkout"));
        params.insert("n".to_string(), serde_json::json!(5));
        let out = substitute("SELECT * FROM logs WHERE service = :svc LIMIT ${n}", &params);
        assert_eq!(out, "SELECT * FROM logs WHERE service = 'checkout' LIMIT 5");
    }

    #[test]
    fn leaves_placeholder_inside_string_literal_alone() {
        let params = BTreeMap::new();
        let out = substitute("SELECT * FROM logs WHERE message = ':not_a_param' LIMIT 1", &params);
        assert_eq!(out, "SELECT * FROM logs WHERE message = ':not_a_param' LIMIT 1");
    }

    #[test]
    fn escapes_embedded_quote() {
        let mut params = BTreeMap::new();
        params.insert("s".to_string(), serde_json::json!("O'Brien"));
        let out = substitute("SELECT :s", &params);
        assert_eq!(out, "SELECT 'O''Brien'");
    }
}
