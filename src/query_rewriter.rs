use regex::Regex;
use std::sync::LazyLock;

/// A single rewrite rule: decide whether it applies, then transform.
/// Rules must be idempotent and string-safe (never rewrite inside a quoted
/// literal).
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&str) -> bool,
    pub apply: fn(&str) -> String,
}

pub struct QueryRewriter {
    rules: Vec<Rule>,
}

impl Default for QueryRewriter {
    fn default() -> Self {
        Self {
            rules: vec![
                Rule {
                    name: "prewhere_promotion",
                    applies: prewhere_applies,
                    apply: prewhere_apply,
                },
                Rule {
                    name: "count_star_normalization",
                    applies: |sql| contains_outside_strings(sql, "COUNT(*)"),
                    apply: |sql| replace_outside_strings(sql, "COUNT(*)", "COUNT()"),
                },
                Rule {
                    name: "materialized_column_substitution",
                    applies: |sql| contains_outside_strings(sql, "toDate(timestamp)"),
                    apply: |sql| replace_outside_strings(sql, "toDate(timestamp)", "date_partition"),
                },
                Rule {
                    name: "like_to_substring",
                    applies: |sql| LIKE_RE.is_match(sql),
                    apply: like_to_substring_apply,
                },
                Rule {
                    name: "default_output_format",
                    applies: |sql| !contains_outside_strings(&sql.to_uppercase(), "FORMAT"),
                    apply: |sql| format!("{sql} FORMAT JSONEachRow"),
                },
            ],
        }
    }
}

static LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\w+(?:\.\w+)?)\s+LIKE\s+'%([^%']*)%'").unwrap());

impl QueryRewriter {
    /// Apply every applicable rule once, in order, and report which fired.
    /// Running the result back through `rewrite` again must be a no-op.
    pub fn rewrite(&self, sql: &str) -> (String, Vec<String>) {
        let mut current = sql.to_string();
        let mut fired = Vec::new();
        for rule in &self.rules {
            if (rule.applies)(&current) {
                current = (rule.apply)(&current);
                fired.push(rule.name.to_string());
            }
        }
        (current, fired)
    }
}

fn prewhere_applies(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    upper.contains("FROM LOGS")
        && upper.contains("WHERE")
        && !upper.contains("PREWHERE")
        && upper.contains("TIMESTAMP")
}

fn prewhere_apply(sql: &str) -> String {
    // Pull out the first `timestamp <op> <value>` predicate from WHERE and
    // hoist it into a PREWHERE clause ahead of WHERE. Conservative: only
    // handles the common `AND`-joined case and leaves the rest of WHERE
    // untouched if no clean split is found.
    static TS_PRED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)timestamp\s*(>=|<=|>|<|=)\s*([^\s()]+(?:\([^)]*\))?)").unwrap()
    });
    let Some(m) = TS_PRED_RE.find(sql) else {
        return sql.to_string();
    };
    let predicate = m.as_str().to_string();
    let mut rest = sql.to_string();
    rest.replace_range(m.start()..m.end(), "1");
    let rest = rest
        .replacen(" WHERE 1 AND ", " WHERE ", 1)
        .replacen(" WHERE 1", " WHERE 1=1", 1);

    let where_pos = rest.to_uppercase().find(" WHERE ");
    match where_pos {
        Some(pos) => {
            let (head, tail) = rest.split_at(pos);
            format!("{head} PREWHERE {predicate}{tail}")
        }
        None => sql.to_string(),
    }
}

fn like_to_substring_apply(sql: &str) -> String {
    LIKE_RE
        .replace_all(sql, |caps: &regex::Captures| {
            format!("position({}, '{}') > 0", &caps[1], &caps[2])
        })
        .into_owned()
}

fn contains_outside_strings(sql: &str, needle: &str) -> bool {
    find_outside_strings(sql, needle).is_some()
}

fn replace_outside_strings(sql: &str, needle: &str, replacement: &str) -> String {
    match find_outside_strings(sql, needle) {
        Some(pos) => {
            let mut out = sql.to_string();
            out.replace_range(pos..pos + needle.len(), replacement);
            out
        }
        None => sql.to_string(),
    }
}

fn find_outside_strings(sql: &str, needle: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let needle_bytes = needle.as_bytes();
    let mut in_string = false;
    let mut quote = b'\'';
    let mut i = 0;
    while i < bytes.len() {
        if in_string {
            if bytes[i] == quote {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match bytes[i] {
            b'\'' | b'"' => {
                in_string = true;
                quote = bytes[i];
            }
            _ => {
                if sql[i..].as_bytes().starts_with(needle_bytes) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_idempotent() {
        let rewriter = QueryRewriter::default();
        let sql = "SELECT COUNT(*) FROM logs WHERE timestamp > now() AND message LIKE '%boom%' LIMIT 10";
        let (once, _) = rewriter.rewrite(sql);
        let (twice, _) = rewriter.rewrite(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalizes_count_star() {
        let rewriter = QueryRewriter::default();
        let (rewritten, fired) = rewriter.rewrite("SELECT COUNT(*) FROM logs LIMIT 1");
        assert!(rewritten.contains("COUNT()"));
        assert!(fired.contains(&"count_star_normalization".to_string()));
    }

    #[test]
    fn rewrites_like_to_substring() {
        let rewriter = QueryRewriter::default();
        let (rewritten, _) = rewriter.rewrite("SELECT * FROM logs WHERE message LIKE '%timeout%' LIMIT 1");
        assert!(rewritten.contains("position(message, 'timeout') > 0"));
    }

    #[test]
    fn leaves_like_inside_string_literal_alone() {
        let needle = "COUNT(*)";
        assert!(!contains_outside_strings("SELECT 'COUNT(*)' FROM logs", needle));
    }

    #[test]
    fn appends_default_output_format() {
        let rewriter = QueryRewriter::default();
        let (rewritten, fired) =
            rewriter.rewrite("SELECT * FROM logs WHERE message LIKE '%timeout%' LIMIT 5");
        assert!(rewritten.ends_with("LIMIT 5 FORMAT JSONEachRow"));
        assert!(fired.contains(&"default_output_format".to_string()));
    }

    #[test]
    fn does_not_duplicate_existing_format_clause() {
        let rewriter = QueryRewriter::default();
        let (rewritten, fired) = rewriter.rewrite("SELECT * FROM logs LIMIT 1 FORMAT CSV");
        assert_eq!(rewritten.matches("FORMAT").count(), 1);
        assert!(!fired.contains(&"default_output_format".to_string()));
    }
}
