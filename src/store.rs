use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::ApiError;

/// A dynamically typed cell coming back from the store. Rows are
/// `map<string, DynamicValue>` at this boundary; everything above the store
/// adapter converts to typed columns explicitly instead of asserting types.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
    Bool(bool),
    Array(Vec<DynamicValue>),
    Map(BTreeMap<String, DynamicValue>),
}

impl DynamicValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynamicValue::Int(i) => Some(*i),
            DynamicValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Int(i) => Some(*i as f64),
            DynamicValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&serde_json::Value> for DynamicValue {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => DynamicValue::Null,
            serde_json::Value::Bool(b) => DynamicValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DynamicValue::Int(i)
                } else {
                    DynamicValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => DynamicValue::Str(s.clone()),
            serde_json::Value::Array(arr) => {
                DynamicValue::Array(arr.iter().map(DynamicValue::from).collect())
            }
            serde_json::Value::Object(obj) => DynamicValue::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), DynamicValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<DynamicValue> for serde_json::Value {
    fn from(v: DynamicValue) -> Self {
        match v {
            DynamicValue::Null => serde_json::Value::Null,
            DynamicValue::Bool(b) => serde_json::Value::Bool(b),
            DynamicValue::Int(i) => serde_json::json!(i),
            DynamicValue::Float(f) => serde_json::json!(f),
            DynamicValue::Str(s) => serde_json::Value::String(s),
            DynamicValue::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(&b).into_owned()),
            DynamicValue::Timestamp(t) => serde_json::json!(t),
            DynamicValue::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(Into::into).collect())
            }
            DynamicValue::Map(m) => serde_json::Value::Object(
                m.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

pub type Row = BTreeMap<String, DynamicValue>;

/// Capability exposed by the external analytic store. The concrete
/// implementation below is a thin wrapper over the `clickhouse` crate, kept
/// opaque behind this trait so the rest of the pipeline only ever depends on
/// `exec`/`query`.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn exec(&self, sql: &str) -> Result<(), ApiError>;
    async fn query(&self, sql: &str) -> Result<(Vec<String>, Vec<Row>), ApiError>;
}

/// ClickHouse-backed adapter. `fetch_bytes("JSONEachRow")` requests that
/// output format over HTTP regardless of whether the SQL text already ends
/// in its own `FORMAT` clause (ClickHouse honors an explicit FORMAT in the
/// query text over the transport-level default); rows are converted into
/// the dynamic row representation above.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: clickhouse::Client,
}

impl ClickHouseStore {
    pub fn new(client: clickhouse::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &clickhouse::Client {
        &self.client
    }
}

#[async_trait]
impl StoreAdapter for ClickHouseStore {
    async fn exec(&self, sql: &str) -> Result<(), ApiError> {
        self.client.query(sql).execute().await.map_err(ApiError::from)
    }

    async fn query(&self, sql: &str) -> Result<(Vec<String>, Vec<Row>), ApiError> {
        // The row shape is not known at compile time for arbitrary SQL, so we
        // fetch the raw JSONEachRow bytes and decode each line as an untyped
        // object rather than fetching into a fixed `Row` struct.
        let mut cursor = self
            .client
            .query(sql)
            .fetch_bytes("JSONEachRow")
            .map_err(ApiError::from)?;

        let mut rows = Vec::new();
        let mut columns: Vec<String> = Vec::new();
        while let Some(chunk) = cursor.next().await.map_err(ApiError::from)? {
            for line in chunk.split(|b| *b == b'\n') {
                if line.is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_slice(line)
                    .map_err(|e| ApiError::Store(format!("malformed row: {e}")))?;
                let serde_json::Value::Object(obj) = value else {
                    continue;
                };
                let mut row = Row::new();
                for (k, v) in obj {
                    if !columns.contains(&k) {
                        columns.push(k.clone());
                    }
                    row.insert(k, DynamicValue::from(&v));
                }
                rows.push(row);
            }
        }
        Ok((columns, rows))
    }
}
