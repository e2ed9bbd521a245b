//! Create and edit-in-place forms for a single company.

use tracing::{error, info, warn};

use crate::db::Database;
use crate::models::{Company, CompanyDraft, Identity};

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("company name is required")]
    NameRequired,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// What the caller should do after a successful submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// A row was written; re-fetch the list.
    Refresh,
    /// The update matched no row owned by the identity.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Create,
    Edit(Company),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyForm {
    mode: Mode,
    pub draft: CompanyDraft,
}

impl CompanyForm {
    pub fn create() -> Self {
        Self {
            mode: Mode::Create,
            draft: CompanyDraft::default(),
        }
    }

    pub fn edit(company: &Company) -> Self {
        Self {
            draft: CompanyDraft::from(company),
            mode: Mode::Edit(company.clone()),
        }
    }

    /// Discards local edits. Create forms are cleared; edit forms go back to
    /// the record's stored values.
    pub fn cancel(&mut self) {
        self.draft = match &self.mode {
            Mode::Create => CompanyDraft::default(),
            Mode::Edit(original) => CompanyDraft::from(original),
        };
    }

    /// Writes the draft. Validation failures issue no request; backend
    /// failures are logged and leave the draft as typed.
    pub fn submit(&mut self, db: &Database, identity: &Identity) -> Result<Submitted, FormError> {
        if !self.draft.has_name() {
            return Err(FormError::NameRequired);
        }
        let fields = self.draft.fields();

        match &mut self.mode {
            Mode::Create => {
                let company = db.insert_company(&identity.id, fields).inspect_err(|e| {
                    error!(error = %format!("{:#}", e), "failed to add company");
                })?;
                info!(id = %company.id, name = %company.name, "company added");
                self.draft = CompanyDraft::default();
                Ok(Submitted::Refresh)
            }
            Mode::Edit(original) => {
                let changed = db
                    .update_company(&original.id, &identity.id, &fields)
                    .inspect_err(|e| {
                        error!(id = %original.id, error = %format!("{:#}", e), "update failed");
                    })?;
                if changed == 0 {
                    warn!(id = %original.id, user = %identity.id, "update matched no rows");
                    return Ok(Submitted::Unchanged);
                }
                original.name = fields.name;
                original.website = fields.website;
                original.role = fields.role;
                original.linkedin = fields.linkedin;
                original.status = fields.status;
                Ok(Submitted::Refresh)
            }
        }
    }
}
