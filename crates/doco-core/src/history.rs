//! Client-local state: recent ingestion history and theme preference.
//!
//! [`ClientState`] is a plain value. The app crate loads it at startup and
//! saves it after every mutation; nothing here touches storage. The
//! serialized layout uses two fixed keys, [`HISTORY_KEY`] and
//! [`THEME_KEY`].
//!
//! History is independent of the chunk store. Chunks expire after their
//! TTL while history entries persist, so an old entry can be reopened for
//! display but its document can no longer be queried.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AnalysisResult, FileKind};

pub const HISTORY_KEY: &str = "documagic_history";
pub const THEME_KEY: &str = "theme";

/// Maximum number of history entries kept.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{}': use light or dark", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientState {
    /// Most recent first, at most [`HISTORY_LIMIT`] entries.
    #[serde(rename = "documagic_history", default)]
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub theme: Theme,
}

impl ClientState {
    /// Record a successful ingestion. The new entry goes first and the
    /// list is cut back to [`HISTORY_LIMIT`].
    pub fn record_ingestion(
        &mut self,
        file_name: &str,
        file_size: u64,
        file_type: FileKind,
    ) -> &HistoryItem {
        let item = HistoryItem {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            file_name: file_name.to_string(),
            file_size,
            file_type,
            result: None,
        };
        self.history.insert(0, item);
        self.history.truncate(HISTORY_LIMIT);
        &self.history[0]
    }

    /// Attach the latest answer to a history entry. Returns `false` when no
    /// entry has that id (for example, it was pushed out of the list).
    pub fn attach_result(&mut self, id: &str, result: AnalysisResult) -> bool {
        match self.history.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.result = Some(result);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: &str) -> Option<&HistoryItem> {
        self.history.iter().find(|item| item.id == id)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }
}
