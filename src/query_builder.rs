use crate::error::ApiError;
use crate::models::builder::*;
use crate::query_params::format_value;

/// Resolve a user-facing field name to a column expression. `attributes.x`
/// reaches into the Map(String, String) column; every other name must be in
/// the closed field registry.
pub fn resolve_field(field: &str) -> Result<String, ApiError> {
    if let Some(key) = field.strip_prefix("attributes.") {
        let escaped = key.replace('\'', "\\'");
        return Ok(format!("attributes['{escaped}']"));
    }
    if FIELD_REGISTRY.contains(&field) {
        Ok(field.to_string())
    } else {
        Err(ApiError::Validation(format!("unknown field: {field}")))
    }
}

/// Deterministic structured -> SQL translation for the `logs` table.
pub struct QueryBuilderCompiler;

impl QueryBuilderCompiler {
    pub fn compile(req: &QueryBuilderRequest) -> Result<String, ApiError> {
        let select = Self::build_select(req)?;
        let where_clause = Self::build_where(req)?;
        let group_by = Self::build_group_by(req)?;
        let order_by = Self::build_order_by(req)?;

        let mut sql = format!("SELECT {select} FROM logs");
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        if !group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {group_by}"));
        }
        if !order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {order_by}"));
        }
        sql.push_str(&format!(" LIMIT {}", req.limit.max(1)));
        Ok(sql)
    }

    fn build_select(req: &QueryBuilderRequest) -> Result<String, ApiError> {
        if !req.aggregations.is_empty() {
            let mut parts = Vec::new();
            for field in &req.group_by {
                parts.push(resolve_field(field)?);
            }
            for agg in &req.aggregations {
                let col = resolve_field(&agg.field)?;
                let func = match agg.function {
                    Aggregation::Count => format!("count({col})"),
                    Aggregation::CountDistinct => format!("uniqExact({col})"),
                    Aggregation::Sum => format!("sum({col})"),
                    Aggregation::Avg => format!("avg({col})"),
                    Aggregation::Min => format!("min({col})"),
                    Aggregation::Max => format!("max({col})"),
                };
                let alias = agg.alias.clone().unwrap_or_else(|| default_alias(agg.function));
                parts.push(format!("{func} AS {alias}"));
            }
            return Ok(parts.join(", "));
        }

        if req.fields.is_empty() {
            return Ok("*".to_string());
        }
        let mut cols = Vec::new();
        for f in &req.fields {
            cols.push(resolve_field(f)?);
        }
        Ok(cols.join(", "))
    }

    fn build_where(req: &QueryBuilderRequest) -> Result<String, ApiError> {
        let mut parts = Vec::new();
        if let Some(range) = &req.time_range {
            parts.push(time_range_predicate(range));
        }

        for (i, filter) in req.filters.iter().enumerate() {
            let predicate = build_filter_predicate(filter)?;
            if i == 0 {
                parts.push(predicate);
            } else {
                let op = match filter.logical_operator {
                    LogicalOperator::And => "AND",
                    LogicalOperator::Or => "OR",
                };
                parts.push(format!("{op} {predicate}"));
            }
        }

        Ok(parts.join(" AND ").replace("AND AND", "AND").replace("AND OR", "OR"))
    }

    fn build_group_by(req: &QueryBuilderRequest) -> Result<String, ApiError> {
        if req.aggregations.is_empty() || req.group_by.is_empty() {
            return Ok(String::new());
        }
        let mut cols = Vec::new();
        for f in &req.group_by {
            cols.push(resolve_field(f)?);
        }
        Ok(cols.join(", "))
    }

    fn build_order_by(req: &QueryBuilderRequest) -> Result<String, ApiError> {
        let mut parts = Vec::new();
        for order in &req.order_by {
            let col = resolve_field(&order.field)?;
            let dir = match order.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            parts.push(format!("{col} {dir}"));
        }
        Ok(parts.join(", "))
    }
}

fn default_alias(agg: Aggregation) -> String {
    match agg {
        Aggregation::Count => "count",
        Aggregation::CountDistinct => "count_distinct",
        Aggregation::Sum => "sum",
        Aggregation::Avg => "avg",
        Aggregation::Min => "min",
        Aggregation::Max => "max",
    }
    .to_string()
}

fn time_range_predicate(range: &TimeRange) -> String {
    match range {
        TimeRange::Relative { window } => {
            format!(
                "timestamp > now() - INTERVAL {} SECOND",
                window.duration().num_seconds()
            )
        }
        TimeRange::Absolute { start, end } => format!(
            "timestamp BETWEEN '{}' AND '{}'",
            start.format("%Y-%m-%d %H:%M:%S"),
            end.format("%Y-%m-%d %H:%M:%S"),
        ),
    }
}

fn build_filter_predicate(filter: &BuilderFilter) -> Result<String, ApiError> {
    let field = resolve_field(&filter.field)?;
    Ok(match filter.operator {
        FilterOperator::Equals => format!("{field} = {}", format_value(&filter.value)),
        FilterOperator::NotEquals => format!("{field} != {}", format_value(&filter.value)),
        FilterOperator::Contains => {
            let needle = filter.value.as_str().unwrap_or_default().replace('\'', "''");
            format!("position({field}, '{needle}') > 0")
        }
        FilterOperator::NotContains => {
            let needle = filter.value.as_str().unwrap_or_default().replace('\'', "''");
            format!("position({field}, '{needle}') = 0")
        }
        FilterOperator::GreaterThan => format!("{field} > {}", format_value(&filter.value)),
        FilterOperator::LessThan => format!("{field} < {}", format_value(&filter.value)),
        FilterOperator::GreaterEqual => format!("{field} >= {}", format_value(&filter.value)),
        FilterOperator::LessEqual => format!("{field} <= {}", format_value(&filter.value)),
        FilterOperator::Between => {
            let arr = filter.value.as_array().ok_or_else(|| {
                ApiError::Validation("between filter requires a two-element array".into())
            })?;
            if arr.len() != 2 {
                return Err(ApiError::Validation("between filter requires exactly two values".into()));
            }
            format!("{field} BETWEEN {} AND {}", format_value(&arr[0]), format_value(&arr[1]))
        }
        FilterOperator::In => format!("{field} IN {}", format_array_value(&filter.value)),
        FilterOperator::NotIn => format!("{field} NOT IN {}", format_array_value(&filter.value)),
        FilterOperator::IsNull => format!("{field} = ''"),
        FilterOperator::IsNotNull => format!("{field} != ''"),
    })
}

fn format_array_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("({})", items.join(", "))
        }
        other => format!("({})", format_value(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_field() {
        assert!(resolve_field("nope").is_err());
    }

    #[test]
    fn compiles_simple_select() {
        let req = QueryBuilderRequest {
            fields: vec!["message".into()],
            filters: vec![],
            aggregations: vec![],
            group_by: vec![],
            order_by: vec![],
            time_range: None,
            limit: 10,
        };
        let sql = QueryBuilderCompiler::compile(&req).unwrap();
        assert!(sql.starts_with("SELECT message FROM logs"));
        assert!(sql.contains("LIMIT 10"));
    }

    #[test]
    fn compiles_aggregation_with_group_by() {
        let req = QueryBuilderRequest {
            fields: vec![],
            filters: vec![],
            aggregations: vec![AggregationSpec { function: Aggregation::Count, field: "id".into(), alias: None }],
            group_by: vec!["service".into()],
            order_by: vec![],
            time_range: None,
            limit: 50,
        };
        let sql = QueryBuilderCompiler::compile(&req).unwrap();
        assert!(sql.contains("count(id) AS count"));
        assert!(sql.contains("GROUP BY service"));
    }
}
