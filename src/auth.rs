//! Sign-in against the backend's auth endpoint and the persisted session
//! that supplies bearer tokens to the record store.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::Identity;
use crate::store::TokenSource;

/// Refresh when the access token has less than this many seconds left.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: Identity,
    #[serde(default)]
    pub profile_synced: bool,
}

impl Session {
    pub fn is_expiring(&self, now: i64) -> bool {
        self.expires_at - now < REFRESH_MARGIN_SECS
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        let expires_at = self.expires_at.unwrap_or(now + self.expires_in);
        let display_name = self
            .user
            .user_metadata
            .full_name
            .or(self.user.user_metadata.name)
            .or_else(|| self.user.email.clone());
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: Identity {
                id: self.user.id,
                email: self.user.email,
                display_name,
            },
            profile_synced: false,
        }
    }
}

pub struct AuthClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .context("Sign-in failed")
    }

    pub fn refresh(&self, session: &Session) -> Result<Session> {
        let mut refreshed = self
            .token_grant("refresh_token", json!({ "refresh_token": session.refresh_token }))
            .context("Session refresh failed")?;
        refreshed.profile_synced = session.profile_synced && refreshed.user.id == session.user.id;
        Ok(refreshed)
    }

    pub fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .context("Failed to send sign-out request")?;

        if !response.status().is_success() {
            return Err(anyhow!("Sign-out failed with status {}", response.status()));
        }
        Ok(())
    }

    fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .context("Failed to reach auth endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Auth request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let token: TokenResponse = response
            .json()
            .context("Failed to parse auth response")?;
        Ok(token.into_session(Utc::now().timestamp()))
    }
}

/// The session file on disk.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {}", self.path.display()))?;
        let session = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt session file: {}", self.path.display()))?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove session file: {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// Hands out the current access token, refreshing it when it is about
/// to expire.
pub struct SessionTokens {
    auth: AuthClient,
    store: SessionStore,
    session: Mutex<Session>,
}

impl SessionTokens {
    pub fn new(auth: AuthClient, store: SessionStore, session: Session) -> Self {
        Self {
            auth,
            store,
            session: Mutex::new(session),
        }
    }

    pub fn identity(&self) -> Result<Identity> {
        Ok(self.lock()?.user.clone())
    }

    pub fn profile_synced(&self) -> Result<bool> {
        Ok(self.lock()?.profile_synced)
    }

    pub fn mark_profile_synced(&self) -> Result<()> {
        let mut session = self.lock()?;
        session.profile_synced = true;
        self.store.save(&session)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Session>> {
        self.session
            .lock()
            .map_err(|_| anyhow!("session lock poisoned"))
    }
}

impl TokenSource for SessionTokens {
    fn bearer_token(&self) -> Result<Option<String>> {
        let mut session = self.lock()?;
        if session.is_expiring(Utc::now().timestamp()) {
            info!(user = %session.user.id, "refreshing access token");
            let refreshed = self.auth.refresh(&session)?;
            if let Err(e) = self.store.save(&refreshed) {
                warn!(error = %e, "could not persist refreshed session");
            }
            *session = refreshed;
        }
        Ok(Some(session.access_token.clone()))
    }
}
