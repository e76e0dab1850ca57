use std::sync::Arc;

use crate::error::ApiError;
use crate::models::saved_query::*;
use crate::persistence::{InMemoryStore, Persistence};
use crate::query_validator::SqlValidator;

/// Named, parameterized SQL templates. Built-in templates are seeded on
/// construction and refuse deletion (`created_by == "system"`).
pub struct SavedQueryStore {
    backing: Arc<dyn Persistence<SavedQuery>>,
}

impl SavedQueryStore {
    pub fn new() -> Self {
        let store = Self { backing: Arc::new(InMemoryStore::default()) };
        store
    }

    pub async fn seed_builtins(&self) {
        for template in builtin_templates() {
            self.backing.save(template.id.clone(), template).await;
        }
    }

    pub async fn save(&self, req: CreateSavedQueryRequest) -> Result<SavedQuery, ApiError> {
        validate_name(&req.name)?;
        SqlValidator::validate(&req.sql)?;
        validate_parameters(&req.parameters)?;

        let id = req.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = chrono::Utc::now();
        let query = SavedQuery {
            id: id.clone(),
            name: req.name,
            description: req.description,
            sql: req.sql,
            parameters: req.parameters,
            tags: req.tags,
            category: req.category,
            is_template: req.is_template,
            created_by: req.created_by,
            created_at: now,
            updated_at: now,
            metadata: req.metadata,
        };
        self.backing.save(id, query.clone()).await;
        Ok(query)
    }

    pub async fn get(&self, id: &str) -> Result<SavedQuery, ApiError> {
        self.backing
            .load(id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("saved query {id}")))
    }

    pub async fn list(&self, filter: &SavedQueryFilter) -> Vec<SavedQuery> {
        let mut all = self.backing.load_all().await;
        if let Some(tags) = &filter.tags {
            all.retain(|q| q.tags.iter().any(|t| tags.contains(t)));
        }
        if let Some(category) = &filter.category {
            all.retain(|q| &q.category == category);
        }
        if let Some(is_template) = filter.is_template {
            all.retain(|q| q.is_template == is_template);
        }
        all
    }

    pub async fn update(&self, id: &str, patch: UpdateSavedQueryRequest) -> Result<SavedQuery, ApiError> {
        let mut query = self.get(id).await?;
        if let Some(sql) = patch.sql {
            SqlValidator::validate(&sql)?;
            query.sql = sql;
        }
        if let Some(name) = patch.name {
            validate_name(&name)?;
            query.name = name;
        }
        if let Some(description) = patch.description {
            query.description = description;
        }
        if let Some(parameters) = patch.parameters {
            validate_parameters(&parameters)?;
            query.parameters = parameters;
        }
        if let Some(tags) = patch.tags {
            query.tags = tags;
        }
        if let Some(category) = patch.category {
            query.category = category;
        }
        if let Some(metadata) = patch.metadata {
            query.metadata = metadata;
        }
        query.updated_at = chrono::Utc::now();
        self.backing.save(id.to_string(), query.clone()).await;
        Ok(query)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let query = self.get(id).await?;
        if query.created_by == "system" {
            return Err(ApiError::Permission("built-in saved queries cannot be deleted".into()));
        }
        self.backing.delete(id).await;
        Ok(())
    }
}

impl Default for SavedQueryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".into()));
    }
    Ok(())
}

fn validate_parameters(params: &[SavedQueryParameter]) -> Result<(), ApiError> {
    let mut seen = std::collections::HashSet::new();
    for p in params {
        if !seen.insert(p.name.clone()) {
            return Err(ApiError::Validation(format!("duplicate parameter name: {}", p.name)));
        }
    }
    Ok(())
}

fn builtin_templates() -> Vec<SavedQuery> {
    let now = chrono::Utc::now();
    let base = |id: &str, name: &str, description: &str, sql: &str, tags: &[&str]| SavedQuery {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        sql: sql.to_string(),
        parameters: vec![],
        tags: tags.iter().map(|s| s.to_string()).collect(),
        category: "built-in".to_string(),
        is_template: true,
        created_by: "system".to_string(),
        created_at: now,
        updated_at: now,
        metadata: serde_json::Value::Null,
    };

    vec![
        base(
            "builtin-recent-errors",
            "Recent errors",
            "Last 100 error/fatal log lines",
            "SELECT * FROM logs WHERE level IN ('error', 'fatal') ORDER BY timestamp DESC LIMIT 100",
            &["errors"],
        ),
        base(
            "builtin-error-rate-by-service",
            "Error rate by service",
            "Error count grouped by service over the last hour",
            "SELECT service, count() AS errors FROM logs WHERE level IN ('error', 'fatal') \
             AND timestamp > now() - INTERVAL 1 HOUR GROUP BY service ORDER BY errors DESC LIMIT 50",
            &["errors", "services"],
        ),
        base(
            "builtin-volume-by-minute",
            "Log volume by minute",
            "Log count bucketed by minute over the last hour",
            "SELECT toStartOfMinute(timestamp) AS bucket, count() AS total FROM logs \
             WHERE timestamp > now() - INTERVAL 1 HOUR GROUP BY bucket ORDER BY bucket ASC",
            &["volume"],
        ),
        SavedQuery {
            id: "template-errors-by-service".to_string(),
            name: "Errors by service".to_string(),
            description: "Error count and unique request count per service over a caller-supplied window".to_string(),
            sql: "SELECT service, count() AS error_count, uniqExact(trace_id) AS unique_requests FROM logs \
                  WHERE level IN ('error', 'fatal') AND timestamp > now() - INTERVAL :time_range HOUR \
                  GROUP BY service ORDER BY error_count DESC LIMIT :limit"
                .to_string(),
            parameters: vec![
                SavedQueryParameter {
                    name: "time_range".to_string(),
                    param_type: ParameterType::Number,
                    default: Some(serde_json::json!(24)),
                    required: false,
                    options: None,
                },
                SavedQueryParameter {
                    name: "limit".to_string(),
                    param_type: ParameterType::Number,
                    default: Some(serde_json::json!(10)),
                    required: false,
                    options: None,
                },
            ],
            tags: vec!["errors".to_string(), "services".to_string()],
            category: "built-in".to_string(),
            is_template: true,
            created_by: "system".to_string(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::Value::Null,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn errors_by_service_template_substitutes_parameters() {
        let template = builtin_templates()
            .into_iter()
            .find(|q| q.id == "template-errors-by-service")
            .unwrap();

        let mut params = BTreeMap::new();
        params.insert("time_range".to_string(), serde_json::json!(24));
        params.insert("limit".to_string(), serde_json::json!(10));

        let sql = crate::query_params::substitute(&template.sql, &params);
        assert!(sql.contains("INTERVAL 24 HOUR"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("service"));
        assert!(sql.contains("error_count"));
        assert!(sql.contains("unique_requests"));
    }

    #[tokio::test]
    async fn builtin_templates_are_seeded_and_undeletable() {
        let store = SavedQueryStore::new();
        store.seed_builtins().await;
        let found = store.get("template-errors-by-service").await.unwrap();
        assert_eq!(found.created_by, "system");
        assert!(store.delete("template-errors-by-service").await.is_err());
    }
}
