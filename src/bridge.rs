use tracing::{error, info};

use crate::db::Database;
use crate::models::{Identity, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// Signed out, or the identity was already handled.
    Skipped,
    Stored,
    Failed,
}

/// Copies the signed-in identity into the `users` table, once per newly
/// observed identity.
#[derive(Debug, Default)]
pub struct IdentityBridge {
    synced: Option<String>,
}

impl IdentityBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge that treats `identity_id` as already synced, for sessions
    /// restored from disk.
    pub fn resumed(identity_id: &str) -> Self {
        Self {
            synced: Some(identity_id.to_string()),
        }
    }

    /// Upserts the profile when `identity` is new to this bridge. Failures
    /// are logged and not retried for the same identity.
    pub fn observe(&mut self, db: &Database, identity: Option<&Identity>) -> Observed {
        let Some(identity) = identity else {
            self.synced = None;
            return Observed::Skipped;
        };
        if self.synced.as_deref() == Some(identity.id.as_str()) {
            return Observed::Skipped;
        }
        self.synced = Some(identity.id.clone());

        match db.upsert_user(&UserProfile::from(identity)) {
            Ok(()) => {
                info!(user = %identity.id, "user profile stored");
                Observed::Stored
            }
            Err(e) => {
                error!(user = %identity.id, error = %format!("{:#}", e), "error storing user");
                Observed::Failed
            }
        }
    }
}
