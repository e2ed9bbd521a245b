//! Table-level access to the hosted backend.
//!
//! `TableStore` is the operation set the rest of the crate programs
//! against. `RestStore` speaks the PostgREST dialect over HTTP; tests use
//! the in-memory store in `store::memory`.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
pub mod memory;

pub type Row = Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Backend { status: StatusCode, message: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no credential available: {0:#}")]
    Credential(anyhow::Error),
}

/// Equality predicate on a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }
}

pub trait TableStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError>;
    fn insert(&self, table: &str, row: &Row) -> Result<Vec<Row>, StoreError>;
    /// Returns the rows the filters matched after the patch was applied.
    fn update(&self, table: &str, patch: &Row, filters: &[Filter]) -> Result<Vec<Row>, StoreError>;
    /// Returns the deleted rows; an empty vec means nothing matched.
    fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, StoreError>;
    fn upsert(&self, table: &str, row: &Row, on_conflict: &str) -> Result<Vec<Row>, StoreError>;
}

/// Source of the bearer token attached to each request.
pub trait TokenSource {
    /// `Ok(None)` means signed out; the anon key is sent instead.
    fn bearer_token(&self) -> anyhow::Result<Option<String>>;
}

pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    tokens: Arc<dyn TokenSource + Send + Sync>,
}

impl RestStore {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenSource + Send + Sync>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            tokens,
        })
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        let token = self
            .tokens
            .bearer_token()
            .map_err(StoreError::Credential)?
            .unwrap_or_else(|| self.api_key.clone());
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        debug!(%method, %url, "backend request");
        Ok(self
            .client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", token)))
    }

    fn send(&self, request: RequestBuilder) -> Result<Vec<Row>, StoreError> {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(StoreError::Backend {
                status,
                message: backend_message(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(&body)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
        .collect()
}

/// PostgREST errors are `{"message": ..., "details": ..., "code": ...}`;
/// anything else is passed through as text.
fn backend_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("message")
            .or_else(|| value.get("msg"))
            .or_else(|| value.get("error_description"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

impl TableStore for RestStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(&query.filters));
        if let Some(order) = &query.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        self.send(self.request(Method::GET, table)?.query(&params))
    }

    fn insert(&self, table: &str, row: &Row) -> Result<Vec<Row>, StoreError> {
        self.send(
            self.request(Method::POST, table)?
                .header("Prefer", "return=representation")
                .json(row),
        )
    }

    fn update(&self, table: &str, patch: &Row, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        self.send(
            self.request(Method::PATCH, table)?
                .query(&filter_params(filters))
                .header("Prefer", "return=representation")
                .json(patch),
        )
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        self.send(
            self.request(Method::DELETE, table)?
                .query(&filter_params(filters))
                .header("Prefer", "return=representation"),
        )
    }

    fn upsert(&self, table: &str, row: &Row, on_conflict: &str) -> Result<Vec<Row>, StoreError> {
        self.send(
            self.request(Method::POST, table)?
                .query(&[("on_conflict", on_conflict)])
                .header("Prefer", "resolution=merge-duplicates,return=representation")
                .json(row),
        )
    }
}
