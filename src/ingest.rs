//! `doco ingest`: upload one document into the chunk store.
//!
//! A successful ingest records a history entry. A failed one drives the
//! session into its error state, prints the generic failure message, and
//! exits non-zero with the underlying cause.

use std::path::Path;

use anyhow::Result;
use tracing::{error, warn};

use doco_core::chunk::chunk_text;
use doco_core::session::{Session, SessionState};
use doco_core::{Document, IngestReport, Pipeline};

use crate::app::{build_extractor, build_pipeline, read_document};
use crate::client_state;
use crate::config::Config;

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    mime: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let document = read_document(path, mime)?;

    if dry_run {
        return dry_run_ingest(config, &document).await;
    }

    let pipeline = build_pipeline(config).await?;
    let mut session = Session::new();
    let report = ingest_with_session(config, &pipeline, &mut session, &document).await?;

    println!(
        "Ingested {}: {} chunks, {} characters",
        path.display(),
        report.chunks,
        report.characters
    );
    println!("  sha256:  {}", report.digest);
    if let Some(id) = session.current_id() {
        println!("  history: {}", id);
    }
    Ok(())
}

/// Run one ingestion through the session state machine and record it in
/// client history on success.
pub async fn ingest_with_session(
    config: &Config,
    pipeline: &Pipeline,
    session: &mut Session,
    document: &Document,
) -> Result<IngestReport> {
    session.begin_ingest()?;

    match pipeline.ingest(document).await {
        Ok(report) => {
            // The chunks are stored; a history write failure does not undo that.
            let history_id = match record_history(config, document) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "failed to record ingest in history");
                    None
                }
            };
            session.ingest_succeeded(history_id)?;
            Ok(report)
        }
        Err(e) => {
            error!(code = e.code(), error = %e, "ingest failed");
            session.ingest_failed(&e.to_string())?;
            if let SessionState::Error(message) = session.state() {
                eprintln!("{}", message);
            }
            Err(e.into())
        }
    }
}

/// Add a history entry for `document` and return its id.
fn record_history(config: &Config, document: &Document) -> Result<String> {
    let mut state = client_state::load(&config.client.state_path)?;
    let file_name = document.name.as_deref().unwrap_or("upload");
    let id = state
        .record_ingestion(file_name, document.size, document.kind())
        .id
        .clone();
    client_state::save(&config.client.state_path, &state)?;
    Ok(id)
}

async fn dry_run_ingest(config: &Config, document: &Document) -> Result<()> {
    let extractor = build_extractor(config)?;
    let text = extractor.extract_text(document).await?;
    let chunks = chunk_text(&text, config.chunking.size, config.chunking.overlap)?;

    println!("Ingest dry-run ({} extractor):", extractor.name());
    println!("  characters: {}", text.chars().count());
    println!("  chunks:     {}", chunks.len());
    Ok(())
}
