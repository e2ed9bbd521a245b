mod auth;
mod bridge;
mod config;
mod db;
mod form;
mod list;
mod models;
mod store;
mod tui;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use auth::{AuthClient, Session, SessionStore, SessionTokens};
use bridge::{IdentityBridge, Observed};
use config::Config;
use db::Database;
use form::{CompanyForm, Submitted};
use list::{CompanyList, LoadState};
use models::{Company, CompanyStatus, Identity};
use store::RestStore;

#[derive(Parser)]
#[command(name = "jobtracker")]
#[command(about = "Track the companies you applied to and where each application stands")]
struct Cli {
    /// Log debug output to stderr (or JOBTRACKER_LOG_FILE)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Path to a file holding the password (otherwise JOBTRACKER_PASSWORD)
        #[arg(short, long)]
        password_file: Option<String>,
    },

    /// Sign out and forget the local session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Add a company
    Add {
        /// Company name
        name: String,

        /// Role or position
        #[arg(short, long)]
        role: Option<String>,

        /// Company website
        #[arg(short, long)]
        website: Option<String>,

        /// LinkedIn URL or handle
        #[arg(short, long)]
        linkedin: Option<String>,

        /// Application status (applied, coding-round, interview, offer)
        #[arg(short, long, default_value = "applied")]
        status: CompanyStatus,
    },

    /// List companies, newest first
    List {
        /// Only show companies whose name or role contains this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show company details
    Show {
        /// Company ID
        id: String,
    },

    /// Edit a company's fields
    Edit {
        /// Company ID
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(short, long)]
        website: Option<String>,

        #[arg(short, long)]
        linkedin: Option<String>,

        #[arg(short, long)]
        status: Option<CompanyStatus>,
    },

    /// Set the application status of a company
    Status {
        /// Company ID
        id: String,

        /// New status (applied, coding-round, interview, offer)
        status: CompanyStatus,
    },

    /// Delete a company
    Delete {
        /// Company ID
        id: String,
    },

    /// Browse applications interactively
    Browse,
}

const SIGN_IN_PROMPT: &str = "Please sign in to access your job tracker:
  jobtracker login --email <you@example.com>";

/// A signed-in connection to the backend.
struct App {
    db: Database,
    identity: Identity,
}

impl App {
    /// Connects with the saved session. `None` when nobody is signed in;
    /// nothing is sent to the backend in that case.
    fn resume(config: &Config) -> Result<Option<Self>> {
        match SessionStore::new(&config.session_path).load()? {
            Some(session) => Ok(Some(Self::connect(config, session)?)),
            None => Ok(None),
        }
    }

    /// Wires the session into the record store and syncs the user profile
    /// until one upsert for this session has succeeded.
    fn connect(config: &Config, session: Session) -> Result<Self> {
        let auth = AuthClient::new(&config.backend_url, &config.anon_key, config.request_timeout)?;
        let tokens = Arc::new(SessionTokens::new(
            auth,
            SessionStore::new(&config.session_path),
            session,
        ));
        let store = RestStore::new(
            &config.backend_url,
            &config.anon_key,
            config.request_timeout,
            tokens.clone(),
        )?;
        let db = Database::new(Arc::new(store));
        let identity = tokens.identity()?;

        let mut bridge = if tokens.profile_synced()? {
            IdentityBridge::resumed(&identity.id)
        } else {
            IdentityBridge::new()
        };
        if bridge.observe(&db, Some(&identity)) == Observed::Stored {
            if let Err(e) = tokens.mark_profile_synced() {
                warn!(error = %format!("{:#}", e), "could not record profile sync");
            }
        }

        Ok(Self { db, identity })
    }

    fn load_list(&self) -> Result<CompanyList> {
        let mut list = CompanyList::new();
        list.set_identity(&self.db, Some(&self.identity));
        if let LoadState::Error(message) = list.state() {
            return Err(anyhow!("Error fetching companies: {}", message));
        }
        Ok(list)
    }

    fn find(&self, id: &str) -> Result<Option<Company>> {
        Ok(self
            .load_list()?
            .companies()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }
}

fn init_logging(verbose: bool, log_file: Option<PathBuf>, quiet_stderr: bool) -> Result<()> {
    let default = if verbose { "jobtracker=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        // stderr would draw over the terminal UI
        None if quiet_stderr => BoxMakeWriter::new(std::io::sink),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(())
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

fn read_password(password_file: Option<&str>) -> Result<String> {
    if let Some(file) = password_file {
        let path = expand_home(file);
        let password = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read password file: {}", path.display()))?;
        return Ok(password.trim().to_string());
    }
    std::env::var("JOBTRACKER_PASSWORD")
        .context("No password given. Use --password-file or set JOBTRACKER_PASSWORD")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let log_file = std::env::var("JOBTRACKER_LOG_FILE").ok().map(|p| expand_home(&p));
    init_logging(cli.verbose, log_file, matches!(cli.command, Commands::Browse))?;

    let sessions = SessionStore::new(&config.session_path);

    match cli.command {
        Commands::Login {
            email,
            password_file,
        } => {
            let password = read_password(password_file.as_deref())?;
            let auth = AuthClient::new(&config.backend_url, &config.anon_key, config.request_timeout)?;
            let session = auth.sign_in_with_password(&email, &password)?;
            sessions.save(&session)?;
            let app = App::connect(&config, session)?;
            println!("Signed in as {}", describe(&app.identity));
        }

        Commands::Logout => match sessions.load()? {
            Some(session) => {
                let auth = AuthClient::new(&config.backend_url, &config.anon_key, config.request_timeout)?;
                if let Err(e) = auth.sign_out(&session) {
                    warn!(error = %format!("{:#}", e), "sign-out request failed");
                }
                sessions.clear()?;
                println!("Signed out.");
            }
            None => println!("Not signed in."),
        },

        command => {
            let Some(app) = App::resume(&config)? else {
                println!("{}", SIGN_IN_PROMPT);
                return Ok(());
            };
            run(&app, command)?;
        }
    }

    Ok(())
}

fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Whoami => {
            println!("{}", describe(&app.identity));
            println!("User ID: {}", app.identity.id);
        }

        Commands::Add {
            name,
            role,
            website,
            linkedin,
            status,
        } => {
            let mut form = CompanyForm::create();
            form.draft.name = name.clone();
            form.draft.role = role.unwrap_or_default();
            form.draft.website = website.unwrap_or_default();
            form.draft.linkedin = linkedin.unwrap_or_default();
            form.draft.status = status;
            form.submit(&app.db, &app.identity)?;
            println!("Added '{}' ({}).", name.trim(), status);
        }

        Commands::List { search } => {
            let mut list = app.load_list()?;
            list.search = search.unwrap_or_default();
            print_list(&list);
        }

        Commands::Show { id } => match app.find(&id)? {
            Some(company) => {
                println!("Company {}", company.id);
                println!("Name: {}", company.name);
                println!(
                    "Role: {}",
                    company.role.as_deref().unwrap_or("Position not specified")
                );
                println!("Status: {}", company.status);
                if let Some(website) = &company.website {
                    println!("Website: {}", website);
                }
                if let Some(url) = company.linkedin_url() {
                    println!("LinkedIn: {}", url);
                }
                println!("Added: {}", company.created_at.format("%Y-%m-%d %H:%M:%S"));
            }
            None => println!("Company {} not found.", id),
        },

        Commands::Edit {
            id,
            name,
            role,
            website,
            linkedin,
            status,
        } => {
            let Some(company) = app.find(&id)? else {
                println!("Company {} not found.", id);
                return Ok(());
            };
            let mut form = CompanyForm::edit(&company);
            let untouched = form.draft.clone();
            if let Some(name) = name {
                form.draft.name = name;
            }
            if let Some(role) = role {
                form.draft.role = role;
            }
            if let Some(website) = website {
                form.draft.website = website;
            }
            if let Some(linkedin) = linkedin {
                form.draft.linkedin = linkedin;
            }
            if let Some(status) = status {
                form.draft.status = status;
            }
            if form.draft == untouched {
                println!("Nothing to change.");
                return Ok(());
            }
            save_edit(app, &mut form, &company)?;
        }

        Commands::Status { id, status } => {
            let Some(company) = app.find(&id)? else {
                println!("Company {} not found.", id);
                return Ok(());
            };
            let mut form = CompanyForm::edit(&company);
            form.draft.status = status;
            save_edit(app, &mut form, &company)?;
        }

        Commands::Delete { id } => {
            let mut list = app.load_list()?;
            match list.delete(&app.db, &id)? {
                0 => println!("Company {} not found.", id),
                _ => println!("Deleted company {}.", id),
            }
        }

        Commands::Browse => tui::run_browse(&app.db, &app.identity)?,

        Commands::Login { .. } | Commands::Logout => {}
    }

    Ok(())
}

fn save_edit(app: &App, form: &mut CompanyForm, company: &Company) -> Result<()> {
    match form.submit(&app.db, &app.identity)? {
        Submitted::Refresh => println!("Updated '{}'.", form.draft.name.trim()),
        Submitted::Unchanged => println!("Company {} not found.", company.id),
    }
    Ok(())
}

fn print_list(list: &CompanyList) {
    let companies = list.filtered();
    if list.companies().is_empty() {
        println!("No applications yet. Add your first company with: jobtracker add <name>");
        return;
    }

    if companies.is_empty() {
        println!(
            "No companies match \"{}\". Try a different search term.",
            list.search
        );
    } else {
        println!("{:<38} {:<13} {:<24} {:<24}", "ID", "STATUS", "NAME", "ROLE");
        println!("{}", "-".repeat(100));
        for company in companies {
            println!(
                "{:<38} {:<13} {:<24} {:<24}",
                truncate(&company.id, 36),
                company.status,
                truncate(&company.name, 22),
                truncate(company.role.as_deref().unwrap_or("-"), 22)
            );
        }
    }

    let tallies = list.tallies();
    println!();
    println!(
        "Total: {}   Interviews: {}   Offers: {}",
        tallies.total, tallies.interviews, tallies.offers
    );
}

fn describe(identity: &Identity) -> String {
    match (&identity.display_name, &identity.email) {
        (Some(name), Some(email)) if name != email => format!("{} <{}>", name, email),
        (_, Some(email)) => email.clone(),
        (Some(name), None) => name.clone(),
        (None, None) => identity.id.clone(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
