use serde::{Deserialize, Serialize};

pub const FIELD_REGISTRY: &[&str] = &[
    "id", "timestamp", "level", "message", "service", "trace_id", "span_id", "raw_log",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Between,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

impl Default for LogicalOperator {
    fn default() -> Self {
        LogicalOperator::And
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuilderFilter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationSpec {
    pub function: Aggregation,
    pub field: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderSpec {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeRange {
    Relative { window: RelativeWindow },
    Absolute { start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeWindow {
    Last1m,
    Last5m,
    Last15m,
    Last1h,
    Last24h,
    Last7d,
    Last30d,
}

impl RelativeWindow {
    pub fn duration(&self) -> chrono::Duration {
        match self {
            RelativeWindow::Last1m => chrono::Duration::minutes(1),
            RelativeWindow::Last5m => chrono::Duration::minutes(5),
            RelativeWindow::Last15m => chrono::Duration::minutes(15),
            RelativeWindow::Last1h => chrono::Duration::hours(1),
            RelativeWindow::Last24h => chrono::Duration::hours(24),
            RelativeWindow::Last7d => chrono::Duration::days(7),
            RelativeWindow::Last30d => chrono::Duration::days(30),
        }
    }
}

fn default_limit() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryBuilderRequest {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<BuilderFilter>,
    #[serde(default)]
    pub aggregations: Vec<AggregationSpec>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}
