use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanyStatus {
    #[default]
    #[serde(rename = "applied")]
    Applied,
    #[serde(rename = "coding round", alias = "coding_round", alias = "coding-round")]
    CodingRound,
    #[serde(rename = "interview")]
    Interview,
    #[serde(rename = "offer")]
    Offer,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::Applied => "applied",
            CompanyStatus::CodingRound => "coding round",
            CompanyStatus::Interview => "interview",
            CompanyStatus::Offer => "offer",
        }
    }
}

impl fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}' (expected: applied, coding-round, interview, offer)")]
pub struct ParseStatusError(String);

impl FromStr for CompanyStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "applied" => Ok(CompanyStatus::Applied),
            "coding round" | "coding_round" | "coding-round" => Ok(CompanyStatus::CodingRound),
            "interview" => Ok(CompanyStatus::Interview),
            "offer" => Ok(CompanyStatus::Offer),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Older rows may carry a null status; those read as `applied`.
fn status_or_default<'de, D>(deserializer: D) -> Result<CompanyStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<CompanyStatus>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default, deserialize_with = "status_or_default")]
    pub status: CompanyStatus,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn linkedin_url(&self) -> Option<String> {
        self.linkedin.as_deref().and_then(linkedin_url)
    }
}

/// Resolves a stored LinkedIn value to a link: URLs pass through, bare
/// handles become profile links.
pub fn linkedin_url(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else if value.starts_with("http") {
        Some(value.to_string())
    } else {
        Some(format!("https://linkedin.com/in/{}", value))
    }
}

/// Editable field set shared by the create and edit forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyDraft {
    pub name: String,
    pub website: String,
    pub role: String,
    pub linkedin: String,
    pub status: CompanyStatus,
}

impl CompanyDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn fields(&self) -> CompanyFields {
        CompanyFields {
            name: self.name.trim().to_string(),
            website: optional(&self.website),
            role: optional(&self.role),
            linkedin: optional(&self.linkedin),
            status: self.status,
        }
    }
}

impl From<&Company> for CompanyDraft {
    fn from(company: &Company) -> Self {
        Self {
            name: company.name.clone(),
            website: company.website.clone().unwrap_or_default(),
            role: company.role.clone().unwrap_or_default(),
            linkedin: company.linkedin.clone().unwrap_or_default(),
            status: company.status,
        }
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Column values written on update. Cleared optional fields go out as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyFields {
    pub name: String,
    pub website: Option<String>,
    pub role: Option<String>,
    pub linkedin: Option<String>,
    pub status: CompanyStatus,
}

/// Insert payload: the field set tagged with its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCompany {
    pub user_id: String,
    #[serde(flatten)]
    pub fields: CompanyFields,
}

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl From<&Identity> for UserProfile {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            full_name: identity
                .display_name
                .clone()
                .or_else(|| identity.email.clone()),
        }
    }
}

/// Counts shown under the list, always taken over the whole collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tallies {
    pub total: usize,
    pub interviews: usize,
    pub offers: usize,
}
