//! The signed-in user's collection of companies: fetch, search, tallies
//! and delete.
//!
//! Every successful write is followed by a full re-fetch; the collection is
//! never patched locally.

use anyhow::Result;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::models::{Company, CompanyStatus, Identity, Tallies};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Populated,
    Empty,
    Error(String),
}

pub struct CompanyList {
    owner: Option<Identity>,
    companies: Vec<Company>,
    state: LoadState,
    pub search: String,
}

impl Default for CompanyList {
    fn default() -> Self {
        Self::new()
    }
}

impl CompanyList {
    pub fn new() -> Self {
        Self {
            owner: None,
            companies: Vec::new(),
            state: LoadState::Uninitialized,
            search: String::new(),
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn owner(&self) -> Option<&Identity> {
        self.owner.as_ref()
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    /// Re-fetches when the identity differs from the current owner. Signing
    /// out drops the collection.
    pub fn set_identity(&mut self, db: &Database, identity: Option<&Identity>) {
        let current = self.owner.as_ref().map(|o| o.id.as_str());
        if current == identity.map(|i| i.id.as_str()) {
            return;
        }
        self.owner = identity.cloned();
        match identity {
            Some(_) => self.refresh(db),
            None => {
                self.companies.clear();
                self.state = LoadState::Uninitialized;
            }
        }
    }

    pub fn refresh(&mut self, db: &Database) {
        let Some(owner) = &self.owner else { return };
        self.state = LoadState::Loading;

        match db.list_companies(&owner.id) {
            Ok(companies) => {
                self.state = if companies.is_empty() {
                    LoadState::Empty
                } else {
                    LoadState::Populated
                };
                self.companies = companies;
            }
            Err(e) => {
                error!(user = %owner.id, error = %format!("{:#}", e), "error fetching companies");
                self.companies.clear();
                self.state = LoadState::Error(format!("{:#}", e));
            }
        }
    }

    /// Case-insensitive substring match on name or role. An empty search
    /// keeps everything.
    pub fn filtered(&self) -> Vec<&Company> {
        let term = self.search.to_lowercase();
        self.companies
            .iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&term)
                    || c.role.as_deref().unwrap_or("").to_lowercase().contains(&term)
            })
            .collect()
    }

    /// Counts over the whole collection, regardless of the search.
    pub fn tallies(&self) -> Tallies {
        let count = |status: CompanyStatus| self.companies.iter().filter(|c| c.status == status).count();
        Tallies {
            total: self.companies.len(),
            interviews: count(CompanyStatus::Interview),
            offers: count(CompanyStatus::Offer),
        }
    }

    /// Deletes a record owned by the current identity and returns the number
    /// of rows removed. When nothing matched, local state is left as is.
    pub fn delete(&mut self, db: &Database, id: &str) -> Result<usize> {
        let Some(owner) = &self.owner else {
            warn!(id, "delete without a signed-in identity");
            return Ok(0);
        };

        let removed = db.delete_company(id, &owner.id).inspect_err(|e| {
            error!(id, error = %format!("{:#}", e), "delete failed");
        })?;

        if removed == 0 {
            warn!(id, user = %owner.id, "delete matched no rows");
        } else {
            info!(id, "company deleted");
            self.refresh(db);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompanyDraft;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: None,
            display_name: None,
        }
    }

    fn setup() -> (Arc<MemoryStore>, Database) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Database::new(store))
    }

    fn add(db: &Database, user: &str, name: &str, role: &str, status: CompanyStatus) -> Company {
        let mut draft = CompanyDraft::named(name);
        draft.role = role.to_string();
        draft.status = status;
        db.insert_company(user, draft.fields()).unwrap()
    }

    #[test]
    fn test_search_and_tallies_scenario() {
        let (_, db) = setup();
        add(&db, "u1", "Acme", "Engineer", CompanyStatus::Interview);
        add(&db, "u1", "Globex", "Manager", CompanyStatus::Offer);

        let mut list = CompanyList::new();
        list.set_identity(&db, Some(&identity("u1")));
        list.search = "eng".to_string();

        let names: Vec<_> = list.filtered().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme"]);
        assert_eq!(
            list.tallies(),
            Tallies {
                total: 2,
                interviews: 1,
                offers: 1
            }
        );
        assert_eq!(list.companies().len(), 2);
    }

    #[test]
    fn test_search_is_case_insensitive_on_name_or_role() {
        let (_, db) = setup();
        add(&db, "u1", "Initech", "", CompanyStatus::Applied);
        add(&db, "u1", "Hooli", "Platform ENGINEER", CompanyStatus::CodingRound);
        add(&db, "u1", "Pied Piper", "Designer", CompanyStatus::Applied);

        let mut list = CompanyList::new();
        list.set_identity(&db, Some(&identity("u1")));

        list.search = "INI".to_string();
        assert_eq!(list.filtered().len(), 1);
        list.search = "engineer".to_string();
        assert_eq!(list.filtered()[0].name, "Hooli");
        list.search = "zzz".to_string();
        assert!(list.filtered().is_empty());
        list.search.clear();
        assert_eq!(list.filtered().len(), 3);
    }

    #[test]
    fn test_tallies_count_exact_statuses() {
        let (_, db) = setup();
        for (i, status) in [
            CompanyStatus::Interview,
            CompanyStatus::Interview,
            CompanyStatus::Offer,
            CompanyStatus::CodingRound,
            CompanyStatus::Applied,
            CompanyStatus::Interview,
        ]
        .into_iter()
        .enumerate()
        {
            add(&db, "u1", &format!("Company {}", i), "", status);
        }

        let mut list = CompanyList::new();
        list.set_identity(&db, Some(&identity("u1")));
        list.search = "company 1".to_string();

        assert_eq!(list.filtered().len(), 1);
        assert_eq!(
            list.tallies(),
            Tallies {
                total: 6,
                interviews: 3,
                offers: 1
            }
        );
    }

    #[test]
    fn test_state_transitions() {
        let (store, db) = setup();
        let mut list = CompanyList::new();
        assert_eq!(list.state(), &LoadState::Uninitialized);

        list.set_identity(&db, Some(&identity("u1")));
        assert_eq!(list.state(), &LoadState::Empty);

        add(&db, "u1", "Acme", "", CompanyStatus::Applied);
        list.refresh(&db);
        assert_eq!(list.state(), &LoadState::Populated);

        store.fail_with("connection reset");
        list.refresh(&db);
        assert!(matches!(list.state(), LoadState::Error(_)));
        assert!(list.companies().is_empty());

        store.recover();
        list.set_identity(&db, None);
        assert_eq!(list.state(), &LoadState::Uninitialized);
        assert!(list.owner().is_none());
    }

    #[test]
    fn test_identity_change_refetches_only_on_change() {
        let (store, db) = setup();
        add(&db, "u1", "Acme", "", CompanyStatus::Applied);
        add(&db, "u2", "Globex", "", CompanyStatus::Applied);

        let mut list = CompanyList::new();
        list.set_identity(&db, Some(&identity("u1")));
        let requests = store.requests();
        list.set_identity(&db, Some(&identity("u1")));
        assert_eq!(store.requests(), requests);

        list.set_identity(&db, Some(&identity("u2")));
        assert_eq!(list.companies()[0].name, "Globex");
    }

    #[test]
    fn test_delete_refetches() {
        let (_, db) = setup();
        let acme = add(&db, "u1", "Acme", "", CompanyStatus::Applied);
        add(&db, "u1", "Globex", "", CompanyStatus::Applied);

        let mut list = CompanyList::new();
        list.set_identity(&db, Some(&identity("u1")));

        assert_eq!(list.delete(&db, &acme.id).unwrap(), 1);
        assert!(list.companies().iter().all(|c| c.id != acme.id));
        assert!(db.list_companies("u1").unwrap().iter().all(|c| c.id != acme.id));
    }

    #[test]
    fn test_delete_unknown_id_leaves_state() {
        let (store, db) = setup();
        add(&db, "u1", "Acme", "", CompanyStatus::Applied);
        let other = add(&db, "u2", "Globex", "", CompanyStatus::Applied);

        let mut list = CompanyList::new();
        list.set_identity(&db, Some(&identity("u1")));
        let before = list.companies().to_vec();
        let requests = store.requests();

        assert_eq!(list.delete(&db, &other.id).unwrap(), 0);
        assert_eq!(list.companies(), before.as_slice());
        // only the delete itself, no re-fetch
        assert_eq!(store.requests(), requests + 1);
        assert_eq!(db.list_companies("u2").unwrap().len(), 1);
    }
}
