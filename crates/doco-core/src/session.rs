//! Per-upload session state machine.
//!
//! ```text
//! Uploading ──begin_ingest──▶ Analyzing ──ok──▶ Ready ◀──┐
//!                                 │              │       │ query_failed
//!                                 │ failed       ▼       │
//!                                 ▼            Result ───┘
//!                               Error          (query_succeeded loops)
//! ```
//!
//! Ingest failures are loud: the session moves to [`SessionState::Error`]
//! with a message for the user. Query failures are quiet: the session goes
//! back to [`SessionState::Ready`] and the failure is only logged. There is
//! no separate state while a follow-up query is in flight.

use thiserror::Error;
use tracing::warn;

use crate::history::HistoryItem;
use crate::models::AnalysisResult;

/// Message shown when ingestion fails, regardless of the cause.
pub const INGEST_FAILED_MESSAGE: &str =
    "Oops! Something went wrong analyzing your document. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Uploading,
    Analyzing,
    Ready,
    Result(AnalysisResult),
    Error(String),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uploading => "uploading",
            SessionState::Analyzing => "analyzing",
            SessionState::Ready => "ready",
            SessionState::Result(_) => "result",
            SessionState::Error(_) => "error",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    /// History entry for the current document, if any.
    current_id: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uploading,
            current_id: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    fn invalid(&self, event: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state.name(),
            event,
        }
    }

    pub fn begin_ingest(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Uploading => {
                self.state = SessionState::Analyzing;
                Ok(())
            }
            _ => Err(self.invalid("begin ingest")),
        }
    }

    pub fn ingest_succeeded(&mut self, history_id: Option<String>) -> Result<(), SessionError> {
        match self.state {
            SessionState::Analyzing => {
                self.state = SessionState::Ready;
                self.current_id = history_id;
                Ok(())
            }
            _ => Err(self.invalid("finish ingest")),
        }
    }

    pub fn ingest_failed(&mut self, cause: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Analyzing => {
                warn!(cause, "ingest failed");
                self.state = SessionState::Error(INGEST_FAILED_MESSAGE.to_string());
                Ok(())
            }
            _ => Err(self.invalid("fail ingest")),
        }
    }

    pub fn query_succeeded(&mut self, result: AnalysisResult) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready | SessionState::Result(_) => {
                self.state = SessionState::Result(result);
                Ok(())
            }
            _ => Err(self.invalid("show an answer")),
        }
    }

    pub fn query_failed(&mut self, cause: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready | SessionState::Result(_) => {
                warn!(cause, "query failed; returning to ready");
                self.state = SessionState::Ready;
                Ok(())
            }
            _ => Err(self.invalid("fail a query")),
        }
    }

    /// Reopen a history entry for display. Its chunks may have expired.
    pub fn open_history(&mut self, item: &HistoryItem) -> Result<(), SessionError> {
        match self.state {
            SessionState::Uploading | SessionState::Ready | SessionState::Result(_) => {
                self.current_id = Some(item.id.clone());
                self.state = match &item.result {
                    Some(result) => SessionState::Result(result.clone()),
                    None => SessionState::Ready,
                };
                Ok(())
            }
            _ => Err(self.invalid("open history")),
        }
    }

    pub fn reset(&mut self) {
        self.state = SessionState::Uploading;
        self.current_id = None;
    }
}
