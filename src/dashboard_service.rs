use std::sync::Arc;

use crate::error::ApiError;
use crate::models::dashboard::*;
use crate::models::query::QueryRequest;
use crate::persistence::{InMemoryStore, Persistence};
use crate::query_builder::QueryBuilderCompiler;
use crate::query_engine::QueryEngine;
use crate::saved_query::SavedQueryStore;

/// Dashboard CRUD plus widget evaluation. Widgets carry a `DataSource`
/// rather than raw SQL; evaluating one means resolving that source to a
/// `QueryRequest` and running it through the same engine ad-hoc queries use,
/// then reshaping the result for the widget's display type.
pub struct DashboardService {
    backing: Arc<dyn Persistence<Dashboard>>,
    shares: Arc<dyn Persistence<DashboardShare>>,
    saved_queries: Arc<SavedQueryStore>,
    query_engine: Arc<QueryEngine>,
}

impl DashboardService {
    pub fn new(saved_queries: Arc<SavedQueryStore>, query_engine: Arc<QueryEngine>) -> Self {
        Self {
            backing: Arc::new(InMemoryStore::default()),
            shares: Arc::new(InMemoryStore::default()),
            saved_queries,
            query_engine,
        }
    }

    pub async fn create(&self, req: CreateDashboardRequest) -> Result<Dashboard, ApiError> {
        if req.name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
        let now = chrono::Utc::now();
        let dashboard = Dashboard {
            id: req.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: req.name,
            description: req.description,
            widgets: Vec::new(),
            layout: req.layout,
            settings: req.settings,
            owner: req.owner,
            shared_with: Vec::new(),
            is_public: req.is_public,
            created_at: now,
            updated_at: now,
        };
        self.backing.save(dashboard.id.clone(), dashboard.clone()).await;
        Ok(dashboard)
    }

    pub async fn get(&self, id: &str) -> Result<Dashboard, ApiError> {
        self.backing.load(id).await.ok_or_else(|| ApiError::NotFound(format!("dashboard {id}")))
    }

    pub async fn list(&self) -> Vec<Dashboard> {
        self.backing.load_all().await
    }

    pub async fn update(&self, id: &str, patch: UpdateDashboardRequest) -> Result<Dashboard, ApiError> {
        let mut dashboard = self.get(id).await?;
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(ApiError::Validation("name must not be empty".into()));
            }
            dashboard.name = name;
        }
        if let Some(description) = patch.description {
            dashboard.description = description;
        }
        if let Some(layout) = patch.layout {
            dashboard.layout = layout;
        }
        if let Some(settings) = patch.settings {
            dashboard.settings = settings;
        }
        if let Some(is_public) = patch.is_public {
            dashboard.is_public = is_public;
        }
        if let Some(shared_with) = patch.shared_with {
            dashboard.shared_with = shared_with;
        }
        dashboard.updated_at = chrono::Utc::now();
        self.backing.save(id.to_string(), dashboard.clone()).await;
        Ok(dashboard)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.get(id).await?;
        self.backing.delete(id).await;
        Ok(())
    }

    pub async fn add_widget(&self, dashboard_id: &str, req: CreateWidgetRequest) -> Result<DashboardWidget, ApiError> {
        let mut dashboard = self.get(dashboard_id).await?;
        let widget = DashboardWidget {
            id: uuid::Uuid::new_v4().to_string(),
            title: req.title,
            widget_type: req.widget_type,
            config: req.config,
            data_source: req.data_source,
            position: req.position,
            size: req.size,
            refresh_rate_ms: req.refresh_rate_ms,
        };
        dashboard.widgets.push(widget.clone());
        dashboard.updated_at = chrono::Utc::now();
        self.backing.save(dashboard_id.to_string(), dashboard).await;
        Ok(widget)
    }

    pub async fn update_widget(
        &self,
        dashboard_id: &str,
        widget_id: &str,
        patch: UpdateWidgetRequest,
    ) -> Result<DashboardWidget, ApiError> {
        let mut dashboard = self.get(dashboard_id).await?;
        let widget = dashboard
            .widgets
            .iter_mut()
            .find(|w| w.id == widget_id)
            .ok_or_else(|| ApiError::NotFound(format!("widget {widget_id}")))?;
        if let Some(title) = patch.title {
            widget.title = title;
        }
        if let Some(config) = patch.config {
            widget.config = config;
        }
        if let Some(data_source) = patch.data_source {
            widget.data_source = data_source;
        }
        if let Some(position) = patch.position {
            widget.position = position;
        }
        if let Some(size) = patch.size {
            widget.size = size;
        }
        if let Some(refresh_rate_ms) = patch.refresh_rate_ms {
            widget.refresh_rate_ms = refresh_rate_ms;
        }
        let updated = widget.clone();
        dashboard.updated_at = chrono::Utc::now();
        self.backing.save(dashboard_id.to_string(), dashboard).await;
        Ok(updated)
    }

    pub async fn delete_widget(&self, dashboard_id: &str, widget_id: &str) -> Result<(), ApiError> {
        let mut dashboard = self.get(dashboard_id).await?;
        let before = dashboard.widgets.len();
        dashboard.widgets.retain(|w| w.id != widget_id);
        if dashboard.widgets.len() == before {
            return Err(ApiError::NotFound(format!("widget {widget_id}")));
        }
        dashboard.updated_at = chrono::Utc::now();
        self.backing.save(dashboard_id.to_string(), dashboard).await;
        Ok(())
    }

    /// Resolve a widget's data source and shape the result for its
    /// presentation type. Errors from the query engine surface as the
    /// widget's `error` field rather than failing the whole dashboard.
    pub async fn evaluate_widget(&self, dashboard_id: &str, widget_id: &str) -> Result<WidgetResult, ApiError> {
        let dashboard = self.get(dashboard_id).await?;
        let widget = dashboard
            .widgets
            .iter()
            .find(|w| w.id == widget_id)
            .ok_or_else(|| ApiError::NotFound(format!("widget {widget_id}")))?;
        Ok(self.run_widget(widget).await)
    }

    pub async fn evaluate_all(&self, dashboard_id: &str) -> Result<Vec<WidgetResult>, ApiError> {
        let dashboard = self.get(dashboard_id).await?;
        let mut results = Vec::with_capacity(dashboard.widgets.len());
        for widget in &dashboard.widgets {
            results.push(self.run_widget(widget).await);
        }
        Ok(results)
    }

    async fn run_widget(&self, widget: &DashboardWidget) -> WidgetResult {
        let sql = match self.resolve_sql(&widget.data_source).await {
            Ok(sql) => sql,
            Err(e) => return WidgetResult::error(&widget.id, e.to_string()),
        };

        let response = self
            .query_engine
            .execute(QueryRequest {
                query: sql,
                parameters: Default::default(),
                timeout_ms: 15_000,
                max_rows: 1000,
                use_cache: true,
                page_size: None,
                page_token: None,
                sort_by: None,
                sort_order: Default::default(),
                keyset: false,
            })
            .await;

        if let Some(error) = response.error {
            return WidgetResult::error(&widget.id, error);
        }

        let shaped = shape_result(widget.widget_type, &response.columns, &response.rows);
        WidgetResult { widget_id: widget.id.clone(), error: None, data: shaped }
    }

    async fn resolve_sql(&self, source: &DataSource) -> Result<String, ApiError> {
        match source {
            DataSource::CustomSql { sql, .. } => Ok(sql.clone()),
            DataSource::SavedQuery { id, parameters } => {
                let saved = self.saved_queries.get(id).await?;
                Ok(crate::query_params::substitute(&saved.sql, parameters))
            }
            DataSource::QueryBuilder { request } => QueryBuilderCompiler::compile(request),
        }
    }

    pub async fn create_share(&self, dashboard_id: &str, req: ShareDashboardRequest) -> Result<DashboardShare, ApiError> {
        self.get(dashboard_id).await?;
        let share = DashboardShare {
            token: uuid::Uuid::new_v4().to_string(),
            dashboard_id: dashboard_id.to_string(),
            permissions: req.permissions,
            expires_at: req.expires_at,
        };
        self.shares.save(share.token.clone(), share.clone()).await;
        Ok(share)
    }

    /// Resolve a share token to its dashboard, rejecting expired shares.
    pub async fn resolve_share(&self, token: &str) -> Result<Dashboard, ApiError> {
        let share = self.shares.load(token).await.ok_or_else(|| ApiError::NotFound(format!("share {token}")))?;
        if let Some(expires_at) = share.expires_at {
            if expires_at < chrono::Utc::now() {
                return Err(ApiError::NotFound(format!("share {token}")));
            }
        }
        self.get(&share.dashboard_id).await
    }

    /// Owner has full access; public dashboards and those shared with the
    /// requester are read-only for everyone else.
    pub fn can_read(dashboard: &Dashboard, requestor: &RequestorIdentity) -> bool {
        if dashboard.is_public {
            return true;
        }
        match &requestor.user {
            Some(user) => &dashboard.owner == user || dashboard.shared_with.contains(user),
            None => false,
        }
    }

    pub fn can_write(dashboard: &Dashboard, requestor: &RequestorIdentity) -> bool {
        matches!(&requestor.user, Some(user) if &dashboard.owner == user)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WidgetResult {
    pub widget_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: serde_json::Value,
}

impl WidgetResult {
    fn error(widget_id: &str, error: impl Into<String>) -> Self {
        Self { widget_id: widget_id.to_string(), error: Some(error.into()), data: serde_json::Value::Null }
    }
}

/// Reshape a raw column/row result for a widget type. Chart widgets need
/// label/series pairs, metric widgets a single scalar, table/text pass
/// through untouched.
fn shape_result(widget_type: WidgetType, columns: &[String], rows: &[serde_json::Value]) -> serde_json::Value {
    match widget_type {
        WidgetType::Metric => rows
            .first()
            .and_then(|row| columns.iter().find_map(|c| row.get(c).filter(|v| v.is_number())))
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        WidgetType::Chart => {
            let label_col = columns.first();
            let series_col = columns.get(1);
            let points: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let label = label_col.and_then(|c| row.get(c)).cloned().unwrap_or(serde_json::Value::Null);
                    let value = series_col.and_then(|c| row.get(c)).cloned().unwrap_or(serde_json::Value::Null);
                    serde_json::json!({ "label": label, "value": value })
                })
                .collect();
            serde_json::Value::Array(points)
        }
        WidgetType::Table | WidgetType::Text => {
            serde_json::json!({ "columns": columns, "rows": rows })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboard(owner: &str, public: bool, shared_with: Vec<String>) -> Dashboard {
        let now = chrono::Utc::now();
        Dashboard {
            id: "d1".into(),
            name: "test".into(),
            description: String::new(),
            widgets: vec![],
            layout: serde_json::Value::Null,
            settings: serde_json::Value::Null,
            owner: owner.to_string(),
            shared_with,
            is_public: public,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_can_write_others_cannot() {
        let d = dashboard("alice", false, vec![]);
        assert!(DashboardService::can_write(&d, &RequestorIdentity { user: Some("alice".into()) }));
        assert!(!DashboardService::can_write(&d, &RequestorIdentity { user: Some("bob".into()) }));
    }

    #[test]
    fn public_dashboard_readable_by_anyone() {
        let d = dashboard("alice", true, vec![]);
        assert!(DashboardService::can_read(&d, &RequestorIdentity { user: None }));
    }

    #[test]
    fn shared_with_grants_read_not_write() {
        let d = dashboard("alice", false, vec!["bob".to_string()]);
        let bob = RequestorIdentity { user: Some("bob".into()) };
        assert!(DashboardService::can_read(&d, &bob));
        assert!(!DashboardService::can_write(&d, &bob));
    }

    #[test]
    fn shapes_metric_widget_as_scalar() {
        let columns = vec!["total".to_string()];
        let rows = vec![serde_json::json!({"total": 42})];
        let shaped = shape_result(WidgetType::Metric, &columns, &rows);
        assert_eq!(shaped, serde_json::json!(42));
    }

    #[test]
    fn metric_widget_skips_leading_non_numeric_column() {
        // SELECT service, count() AS errors FROM logs GROUP BY service LIMIT 1
        let columns = vec!["service".to_string(), "errors".to_string()];
        let rows = vec![serde_json::json!({"service": "api", "errors": 7})];
        let shaped = shape_result(WidgetType::Metric, &columns, &rows);
        assert_eq!(shaped, serde_json::json!(7));
    }
}
