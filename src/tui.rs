use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::db::Database;
use crate::form::{CompanyForm, FormError, Submitted};
use crate::list::{CompanyList, LoadState};
use crate::models::{Company, CompanyDraft, CompanyStatus, Identity};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Normal,
    Search,
    AddName(String),
}

struct AppState {
    list: CompanyList,
    selected: usize,
    input: Input,
    message: Option<String>,
}

impl AppState {
    fn new() -> Self {
        Self {
            list: CompanyList::new(),
            selected: 0,
            input: Input::Normal,
            message: None,
        }
    }

    fn visible(&self) -> Vec<&Company> {
        self.list.filtered()
    }

    fn current(&self) -> Option<Company> {
        self.visible().get(self.selected).map(|c| (*c).clone())
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn next(&mut self) {
        let len = self.visible().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn set_status(&mut self, db: &Database, status: CompanyStatus) {
        let Some(company) = self.current() else { return };
        let Some(identity) = self.list.owner().cloned() else { return };
        let mut form = CompanyForm::edit(&company);
        form.draft.status = status;
        self.message = Some(match form.submit(db, &identity) {
            Ok(Submitted::Refresh) => {
                self.list.refresh(db);
                format!("{} -> {}", company.name, status)
            }
            Ok(Submitted::Unchanged) => format!("{} was not updated", company.name),
            Err(e) => format!("Update failed: {:#}", e),
        });
    }

    fn delete_current(&mut self, db: &Database) {
        let Some(company) = self.current() else { return };
        self.message = Some(match self.list.delete(db, &company.id) {
            Ok(0) => format!("{} was not deleted", company.name),
            Ok(_) => format!("Deleted {}", company.name),
            Err(e) => format!("Delete failed: {:#}", e),
        });
        self.clamp_selection();
    }

    fn add(&mut self, db: &Database, name: &str) {
        let Some(identity) = self.list.owner().cloned() else { return };
        let mut form = CompanyForm::create();
        form.draft = CompanyDraft::named(name);
        self.message = Some(match form.submit(db, &identity) {
            Ok(_) => {
                self.list.refresh(db);
                self.selected = 0;
                format!("Added {}", name.trim())
            }
            Err(FormError::NameRequired) => "Company name is required".to_string(),
            Err(e) => format!("Add failed: {:#}", e),
        });
    }
}

pub fn run_browse(db: &Database, identity: &Identity) -> Result<()> {
    let mut state = AppState::new();
    state.list.set_identity(db, Some(identity));

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    db: &Database,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select(if state.visible().is_empty() {
            None
        } else {
            Some(state.selected)
        });
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match state.input.clone() {
            Input::Search => match key.code {
                KeyCode::Enter => state.input = Input::Normal,
                KeyCode::Esc => {
                    state.list.search.clear();
                    state.input = Input::Normal;
                }
                KeyCode::Backspace => {
                    state.list.search.pop();
                    state.selected = 0;
                }
                KeyCode::Char(c) => {
                    state.list.search.push(c);
                    state.selected = 0;
                }
                _ => {}
            },
            Input::AddName(mut name) => match key.code {
                KeyCode::Enter => {
                    state.input = Input::Normal;
                    state.add(db, &name);
                }
                KeyCode::Esc => state.input = Input::Normal,
                KeyCode::Backspace => {
                    name.pop();
                    state.input = Input::AddName(name);
                }
                KeyCode::Char(c) => {
                    name.push(c);
                    state.input = Input::AddName(name);
                }
                _ => {}
            },
            Input::Normal => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('/') => state.input = Input::Search,
                KeyCode::Char('n') => state.input = Input::AddName(String::new()),
                KeyCode::Char('a') => state.set_status(db, CompanyStatus::Applied),
                KeyCode::Char('c') => state.set_status(db, CompanyStatus::CodingRound),
                KeyCode::Char('i') => state.set_status(db, CompanyStatus::Interview),
                KeyCode::Char('o') => state.set_status(db, CompanyStatus::Offer),
                KeyCode::Char('d') | KeyCode::Delete => state.delete_current(db),
                KeyCode::Char('r') => {
                    state.list.refresh(db);
                    state.clamp_selection();
                    state.message = Some("Refreshed".to_string());
                }
                _ => {}
            },
        }
    }
    Ok(())
}

fn status_style(status: CompanyStatus) -> Style {
    match status {
        CompanyStatus::Applied => Style::default().fg(Color::Cyan),
        CompanyStatus::CodingRound => Style::default().fg(Color::Yellow),
        CompanyStatus::Interview => Style::default().fg(Color::Magenta),
        CompanyStatus::Offer => Style::default().fg(Color::Green),
    }
}

fn status_icon(status: CompanyStatus) -> &'static str {
    match status {
        CompanyStatus::Applied => " ",
        CompanyStatus::CodingRound => "*",
        CompanyStatus::Interview => "+",
        CompanyStatus::Offer => "$",
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    // Left panel: filtered companies
    let visible = state.visible();
    let items: Vec<ListItem> = visible
        .iter()
        .map(|company| {
            let role = company.role.as_deref().unwrap_or("-");
            ListItem::new(Line::from(vec![
                Span::styled(status_icon(company.status), status_style(company.status)),
                Span::raw(format!(" {} | {}", company.name, role)),
            ]))
        })
        .collect();

    let title = if state.list.search.is_empty() {
        format!(" Applications ({}) ", state.list.companies().len())
    } else {
        format!(
            " Applications ({}/{}) matching \"{}\" ",
            visible.len(),
            state.list.companies().len(),
            state.list.search
        )
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: detail
    let detail = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, chunks[1]);

    // Tallies over the full collection
    let tallies = state.list.tallies();
    let mut status_line = format!(
        " Total: {}  Interviews: {}  Offers: {}",
        tallies.total, tallies.interviews, tallies.offers
    );
    if let Some(message) = &state.message {
        status_line.push_str(&format!("  | {}", message));
    }
    frame.render_widget(Paragraph::new(status_line), rows[1]);

    let help = match &state.input {
        Input::Search => format!(" /{}  (enter: keep  esc: clear)", state.list.search),
        Input::AddName(name) => format!(" New company: {}  (enter: add  esc: cancel)", name),
        Input::Normal => {
            " j/k:navigate  /:search  n:new  a:applied c:coding i:interview o:offer  d:delete  r:refresh  q:quit"
                .to_string()
        }
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );
}

fn build_detail(state: &AppState) -> Text<'static> {
    match state.list.state() {
        LoadState::Error(message) => {
            return Text::raw(format!("Could not load applications:\n{}", message));
        }
        LoadState::Empty | LoadState::Uninitialized => {
            return Text::raw("No applications yet. Press 'n' to add your first company.");
        }
        LoadState::Loading | LoadState::Populated => {}
    }

    let Some(company) = state.current() else {
        return Text::raw(format!(
            "No companies match \"{}\". Try a different search term.",
            state.list.search
        ));
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        company.name.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(
        company
            .role
            .clone()
            .unwrap_or_else(|| "Position not specified".to_string()),
    ));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", company.status),
        status_style(company.status),
    )));

    if let Some(website) = &company.website {
        lines.push(Line::from(format!("Website: {}", website)));
    }
    if let Some(url) = company.linkedin_url() {
        lines.push(Line::from(format!("LinkedIn: {}", url)));
    }
    lines.push(Line::from(format!(
        "Added: {}",
        company.created_at.format("%Y-%m-%d %H:%M")
    )));

    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn signed_in(db: &Database) -> AppState {
        let mut state = AppState::new();
        state.list.set_identity(
            db,
            Some(&Identity {
                id: "user_1".to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: None,
            }),
        );
        state
    }

    #[test]
    fn test_add_then_status_change() {
        let store = Arc::new(MemoryStore::new());
        let db = Database::new(store.clone());
        let mut state = signed_in(&db);

        state.add(&db, "  Acme ");
        assert_eq!(state.message.as_deref(), Some("Added Acme"));
        state.set_status(&db, CompanyStatus::Interview);

        assert_eq!(state.message.as_deref(), Some("Acme -> interview"));
        assert_eq!(state.list.tallies().interviews, 1);
    }

    #[test]
    fn test_failed_writes_show_backend_message() {
        let store = Arc::new(MemoryStore::new());
        let db = Database::new(store.clone());
        let mut state = signed_in(&db);
        state.add(&db, "Acme");

        store.fail_with("permission denied for table companies");
        state.set_status(&db, CompanyStatus::Offer);
        let message = state.message.clone().unwrap();
        assert!(message.starts_with("Update failed: Failed to update company"));
        assert!(message.contains("permission denied for table companies"));

        state.add(&db, "Globex");
        let message = state.message.clone().unwrap();
        assert!(message.starts_with("Add failed: Failed to add company"));
        assert!(message.contains("permission denied for table companies"));
    }
}
