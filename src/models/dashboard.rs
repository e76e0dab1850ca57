use serde::{Deserialize, Serialize};

use crate::models::builder::QueryBuilderRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Chart,
    Table,
    Metric,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    CustomSql { sql: String, #[serde(default)] parameters: std::collections::BTreeMap<String, serde_json::Value> },
    SavedQuery { id: String, #[serde(default)] parameters: std::collections::BTreeMap<String, serde_json::Value> },
    QueryBuilder { request: QueryBuilderRequest },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardWidget {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    #[serde(default)]
    pub config: serde_json::Value,
    pub data_source: DataSource,
    #[serde(default)]
    pub position: serde_json::Value,
    #[serde(default)]
    pub size: serde_json::Value,
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_ms: u64,
}

fn default_refresh_rate() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub widgets: Vec<DashboardWidget>,
    #[serde(default)]
    pub layout: serde_json::Value,
    #[serde(default)]
    pub settings: serde_json::Value,
    pub owner: String,
    #[serde(default)]
    pub shared_with: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharePermission {
    Read,
    Write,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardShare {
    pub token: String,
    pub dashboard_id: String,
    pub permissions: Vec<SharePermission>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDashboardRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub layout: serde_json::Value,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub is_public: bool,
}

fn default_owner() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateDashboardRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub layout: Option<serde_json::Value>,
    pub settings: Option<serde_json::Value>,
    pub is_public: Option<bool>,
    pub shared_with: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWidgetRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    #[serde(default)]
    pub config: serde_json::Value,
    pub data_source: DataSource,
    #[serde(default)]
    pub position: serde_json::Value,
    #[serde(default)]
    pub size: serde_json::Value,
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWidgetRequest {
    pub title: Option<String>,
    pub config: Option<serde_json::Value>,
    pub data_source: Option<DataSource>,
    pub position: Option<serde_json::Value>,
    pub size: Option<serde_json::Value>,
    pub refresh_rate_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ShareDashboardRequest {
    #[serde(default)]
    pub permissions: Vec<SharePermission>,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Caller identity for access-control checks. Real authentication is out of
/// scope; handlers accept this as a header/query param today.
#[derive(Debug, Clone, Default)]
pub struct RequestorIdentity {
    pub user: Option<String>,
}
