use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub anon_key: String,
    pub request_timeout: Duration,
    pub session_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend_url = first(&lookup, &["JOBTRACKER_URL", "SUPABASE_URL"]).ok_or_else(|| {
            anyhow!("Backend URL not set. Set it with: export JOBTRACKER_URL=https://<project>.supabase.co")
        })?;
        let anon_key = first(&lookup, &["JOBTRACKER_ANON_KEY", "SUPABASE_ANON_KEY"]).ok_or_else(|| {
            anyhow!("Anon key not set. Set it with: export JOBTRACKER_ANON_KEY=your-key-here")
        })?;

        let timeout_secs = match first(&lookup, &["JOBTRACKER_TIMEOUT_SECS"]) {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid JOBTRACKER_TIMEOUT_SECS: {}", raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(anyhow!("JOBTRACKER_TIMEOUT_SECS must be > 0"));
        }

        let session_path = match first(&lookup, &["JOBTRACKER_SESSION"]) {
            Some(path) => PathBuf::from(path),
            None => Self::default_session_path(),
        };

        Ok(Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            anon_key,
            request_timeout: Duration::from_secs(timeout_secs),
            session_path,
        })
    }

    fn default_session_path() -> PathBuf {
        // Use XDG config directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtracker") {
            proj_dirs.config_dir().join("session.json")
        } else {
            PathBuf::from("jobtracker-session.json")
        }
    }
}

/// First non-blank value among `keys`.
fn first(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        lookup(*key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
