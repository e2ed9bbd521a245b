use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Company, CompanyFields, NewCompany, UserProfile};
use crate::store::{Filter, Query, Row, TableStore};

pub const COMPANIES: &str = "companies";
pub const USERS: &str = "users";

/// Typed operations on the `companies` and `users` tables.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn TableStore>,
}

impl Database {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    // --- Company operations ---

    pub fn list_companies(&self, user_id: &str) -> Result<Vec<Company>> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order("created_at", false);
        let rows = self
            .store
            .select(COMPANIES, &query)
            .context("Failed to fetch companies")?;
        debug!(user = user_id, count = rows.len(), "fetched companies");
        decode_rows(rows)
    }

    pub fn insert_company(&self, user_id: &str, fields: CompanyFields) -> Result<Company> {
        let row = serde_json::to_value(NewCompany {
            user_id: user_id.to_string(),
            fields,
        })?;
        let rows = self
            .store
            .insert(COMPANIES, &row)
            .context("Failed to add company")?;
        decode_rows(rows)?
            .pop()
            .ok_or_else(|| anyhow!("Insert returned no row"))
    }

    /// Returns the number of rows changed; zero when the id does not belong
    /// to `user_id`.
    pub fn update_company(&self, id: &str, user_id: &str, fields: &CompanyFields) -> Result<usize> {
        let patch = serde_json::to_value(fields)?;
        let rows = self
            .store
            .update(COMPANIES, &patch, &owned_by(id, user_id))
            .context("Failed to update company")?;
        Ok(rows.len())
    }

    pub fn delete_company(&self, id: &str, user_id: &str) -> Result<usize> {
        let rows = self
            .store
            .delete(COMPANIES, &owned_by(id, user_id))
            .context("Failed to delete company")?;
        Ok(rows.len())
    }

    // --- User operations ---

    pub fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        let row = serde_json::to_value(profile)?;
        self.store
            .upsert(USERS, &row, "id")
            .context("Failed to store user profile")?;
        Ok(())
    }
}

fn owned_by(id: &str, user_id: &str) -> [Filter; 2] {
    [Filter::eq("id", id), Filter::eq("user_id", user_id)]
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<_>, _>>()
        .context("Unexpected row shape from backend")
}
