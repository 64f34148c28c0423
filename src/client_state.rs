//! Client state file plus the `history` and `theme` commands.
//!
//! The file is a JSON object with the `documagic_history` and `theme`
//! keys. It is read once per command and rewritten after every mutation.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::warn;

use doco_core::history::{ClientState, HistoryItem, Theme, HISTORY_KEY, THEME_KEY};
use doco_core::session::{Session, SessionState};

use crate::ask::print_result;
use crate::config::Config;

/// Load client state. A missing file yields the default state. A history
/// value that does not parse is logged and dropped; the theme survives.
pub fn load(path: &Path) -> Result<ClientState> {
    if !path.exists() {
        return Ok(ClientState::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read client state: {}", path.display()))?;

    let root: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "client state is not valid JSON; starting fresh");
            return Ok(ClientState::default());
        }
    };

    let history = match root.get(HISTORY_KEY) {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => serde_json::from_value::<Vec<HistoryItem>>(v.clone()).unwrap_or_else(|e| {
            warn!(error = %e, "failed to parse history; treating it as empty");
            Vec::new()
        }),
    };
    let theme = root
        .get(THEME_KEY)
        .and_then(|v| serde_json::from_value::<Theme>(v.clone()).ok())
        .unwrap_or_default();

    Ok(ClientState { history, theme })
}

pub fn save(path: &Path, state: &ClientState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write client state: {}", path.display()))?;
    Ok(())
}

pub fn run_history_list(config: &Config) -> Result<()> {
    let state = load(&config.client.state_path)?;
    if state.history.is_empty() {
        println!("No history.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<6}  {:>10}  {}",
        "ID", "WHEN", "TYPE", "SIZE", "FILE"
    );
    for item in &state.history {
        let when = chrono::DateTime::from_timestamp_millis(item.timestamp)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| item.timestamp.to_string());
        let marker = if item.result.is_some() { " *" } else { "" };
        println!(
            "{:<36}  {:<16}  {:<6}  {:>10}  {}{}",
            item.id,
            when,
            item.file_type.as_str(),
            item.file_size,
            item.file_name,
            marker
        );
    }
    Ok(())
}

/// Reopen one history entry and print the answer stored with it.
pub fn run_history_show(config: &Config, id: &str, json: bool) -> Result<()> {
    let state = load(&config.client.state_path)?;
    let item = state
        .find(id)
        .ok_or_else(|| anyhow!("No history entry with id {}", id))?;

    let mut session = Session::new();
    session.open_history(item)?;
    print_opened(&session, item, json)
}

/// Print what the session shows after [`Session::open_history`].
pub fn print_opened(session: &Session, item: &HistoryItem, json: bool) -> Result<()> {
    match session.state() {
        SessionState::Result(result) => print_result(result, json),
        _ => {
            println!(
                "No answer stored for {}. Its chunks may have expired; ingest it again to ask questions.",
                item.file_name
            );
            Ok(())
        }
    }
}

pub fn run_history_clear(config: &Config) -> Result<()> {
    let mut state = load(&config.client.state_path)?;
    let removed = state.history.len();
    state.clear_history();
    save(&config.client.state_path, &state)?;
    println!("Cleared {} history entries.", removed);
    Ok(())
}

pub fn run_theme_show(config: &Config) -> Result<()> {
    let state = load(&config.client.state_path)?;
    println!("{}", state.theme.as_str());
    Ok(())
}

pub fn run_theme_toggle(config: &Config) -> Result<()> {
    let mut state = load(&config.client.state_path)?;
    let theme = state.toggle_theme();
    save(&config.client.state_path, &state)?;
    println!("{}", theme.as_str());
    Ok(())
}

pub fn run_theme_set(config: &Config, theme: Theme) -> Result<()> {
    let mut state = load(&config.client.state_path)?;
    state.theme = theme;
    save(&config.client.state_path, &state)?;
    println!("{}", theme.as_str());
    Ok(())
}
