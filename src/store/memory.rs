//! In-process `TableStore` with the backend's row semantics: ids and
//! `created_at` are assigned on insert, filters are equality-only and
//! upserts merge on the conflict column.

use super::{Filter, Query, Row, StoreError, TableStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    next_id: u64,
    requests: usize,
    fail_with: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations issued against the store so far.
    pub fn requests(&self) -> usize {
        self.inner.lock().unwrap().requests
    }

    /// Makes every following operation fail as a backend rejection.
    pub fn fail_with(&self, message: &str) {
        self.inner.lock().unwrap().fail_with = Some(message.to_string());
    }

    pub fn recover(&self) {
        self.inner.lock().unwrap().fail_with = None;
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        let inner = self.inner.lock().unwrap();
        inner
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    fn with<T>(&self, op: impl FnOnce(&mut Inner) -> T) -> Result<T, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests += 1;
        if let Some(message) = &inner.fail_with {
            return Err(StoreError::Backend {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                message: message.clone(),
            });
        }
        Ok(op(&mut inner))
    }
}

impl Inner {
    fn table(&mut self, name: &str) -> &mut Vec<Map<String, Value>> {
        self.tables.entry(name.to_string()).or_default()
    }

    fn assign_defaults(&mut self, row: &mut Map<String, Value>) {
        self.next_id += 1;
        row.entry("id")
            .or_insert_with(|| Value::String(format!("row-{}", self.next_id)));
        row.entry("created_at")
            .or_insert_with(|| Value::String(timestamp(self.next_id).to_rfc3339()));
    }
}

/// Strictly increasing timestamps so insertion order is observable.
fn timestamp(seq: u64) -> DateTime<Utc> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    base + Duration::seconds(seq as i64)
}

fn object(row: &Row) -> Map<String, Value> {
    row.as_object().cloned().unwrap_or_default()
}

fn matches(row: &Map<String, Value>, filters: &[Filter]) -> bool {
    filters.iter().all(|f| match row.get(&f.column) {
        Some(Value::String(s)) => *s == f.value,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == f.value,
    })
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

impl TableStore for MemoryStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.with(|inner| {
            let mut rows: Vec<_> = inner
                .table(table)
                .iter()
                .filter(|row| matches(row, &query.filters))
                .cloned()
                .collect();
            if let Some(order) = &query.order {
                rows.sort_by(|a, b| {
                    let ord = compare(a.get(&order.column), b.get(&order.column));
                    if order.ascending { ord } else { ord.reverse() }
                });
            }
            rows.into_iter().map(Value::Object).collect()
        })
    }

    fn insert(&self, table: &str, row: &Row) -> Result<Vec<Row>, StoreError> {
        self.with(|inner| {
            let mut row = object(row);
            inner.assign_defaults(&mut row);
            inner.table(table).push(row.clone());
            vec![Value::Object(row)]
        })
    }

    fn update(&self, table: &str, patch: &Row, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        let patch = object(patch);
        self.with(|inner| {
            let mut updated = Vec::new();
            for row in inner.table(table).iter_mut().filter(|r| matches(r, filters)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                updated.push(Value::Object(row.clone()));
            }
            updated
        })
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        self.with(|inner| {
            let rows = inner.table(table);
            let (deleted, kept): (Vec<_>, Vec<_>) =
                rows.drain(..).partition(|row| matches(row, filters));
            *rows = kept;
            deleted.into_iter().map(Value::Object).collect()
        })
    }

    fn upsert(&self, table: &str, row: &Row, on_conflict: &str) -> Result<Vec<Row>, StoreError> {
        let incoming = object(row);
        self.with(|inner| {
            let key = incoming.get(on_conflict).cloned();
            let existing = inner
                .table(table)
                .iter_mut()
                .find(|r| key.is_some() && r.get(on_conflict) == key.as_ref());
            if let Some(existing) = existing {
                for (k, v) in &incoming {
                    existing.insert(k.clone(), v.clone());
                }
                return vec![Value::Object(existing.clone())];
            }
            let mut row = incoming.clone();
            inner.assign_defaults(&mut row);
            inner.table(table).push(row.clone());
            vec![Value::Object(row)]
        })
    }
}
