//! `doco ask` and `doco analyze`.

use std::path::Path;

use anyhow::Result;

use doco_core::AnalysisResult;

use crate::app::{build_pipeline, read_document};
use crate::client_state;
use crate::config::Config;

/// Answer a question against the live chunk pool. The answer is attached
/// to the most recent history entry, which is the document the user last
/// uploaded.
pub async fn run_ask(config: &Config, question: &str, json: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let result = pipeline.answer(question).await?;

    let mut state = client_state::load(&config.client.state_path)?;
    if let Some(id) = state.history.first().map(|h| h.id.clone()) {
        state.attach_result(&id, result.clone());
        client_state::save(&config.client.state_path, &state)?;
    }

    print_result(&result, json)
}

/// Summarize a document directly, without retrieval.
pub async fn run_analyze(
    config: &Config,
    path: &Path,
    mime: Option<&str>,
    prompt: Option<&str>,
    json: bool,
) -> Result<()> {
    let document = read_document(path, mime)?;
    let pipeline = build_pipeline(config).await?;
    let result = pipeline.summarize(&document, prompt).await?;
    print_result(&result, json)
}

pub fn print_result(result: &AnalysisResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.summary);
    if !result.key_points.is_empty() {
        println!();
        println!("Key points:");
        for point in &result.key_points {
            println!("  - {}", point);
        }
    }
    if !result.action_items.is_empty() {
        println!();
        println!("Action items:");
        for item in &result.action_items {
            println!("  - {}", item);
        }
    }
    if !result.tone.is_empty() {
        println!();
        println!("Tone: {}", result.tone);
    }
    Ok(())
}
