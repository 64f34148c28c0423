//! `doco chat <file>`: ingest, then answer questions read from stdin.
//!
//! Drives the session state machine end to end. A failed ingest puts the
//! session in its error state with the generic message; `retry` or
//! `reset <file>` starts over. A failed question is logged and the prompt
//! comes back; the previous answer is not shown again.
//!
//! Commands at the prompt:
//!
//! | Input | Effect |
//! |-------|--------|
//! | empty line, `exit`, `quit` | leave |
//! | `history` | list recent uploads |
//! | `open <id>` | reopen a history entry and show its stored answer |
//! | `retry` | analyze the current file again |
//! | `reset <file>` | start over with another file |
//! | anything else | a question |

use std::path::Path;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use doco_core::session::{Session, SessionState};
use doco_core::{Document, Pipeline};

use crate::app::{build_pipeline, read_document};
use crate::ask::print_result;
use crate::client_state;
use crate::config::Config;
use crate::ingest::ingest_with_session;

pub async fn run_chat(config: &Config, path: &Path, mime: Option<&str>) -> Result<()> {
    let mut document = read_document(path, mime)?;
    let pipeline = build_pipeline(config).await?;
    let mut session = Session::new();

    analyze(config, &pipeline, &mut session, &document).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        let (command, arg) = match input.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (input, ""),
        };

        match command {
            "" | "exit" | "quit" => break,
            "history" => client_state::run_history_list(config)?,
            "retry" => {
                session.reset();
                analyze(config, &pipeline, &mut session, &document).await;
            }
            "reset" if !arg.is_empty() => match read_document(Path::new(arg), None) {
                Ok(next) => {
                    document = next;
                    session.reset();
                    analyze(config, &pipeline, &mut session, &document).await;
                }
                Err(e) => println!("{:#}", e),
            },
            "reset" => println!("Usage: reset <file>"),
            "open" if !arg.is_empty() => open_history(config, &mut session, arg)?,
            "open" => println!("Usage: open <id>"),
            _ => ask(config, &pipeline, &mut session, input).await?,
        }
    }

    Ok(())
}

/// Ingest `document` from a fresh session and report the outcome.
async fn analyze(config: &Config, pipeline: &Pipeline, session: &mut Session, document: &Document) {
    let name = document.name.as_deref().unwrap_or("document");
    println!("Analyzing {} ...", name);

    match ingest_with_session(config, pipeline, session, document).await {
        Ok(report) => println!(
            "Ready: {} chunks indexed. Ask a question (empty line to quit).",
            report.chunks
        ),
        Err(_) => println!("Type `retry` to try again, or `reset <file>` to start over."),
    }
}

async fn ask(
    config: &Config,
    pipeline: &Pipeline,
    session: &mut Session,
    question: &str,
) -> Result<()> {
    if !matches!(
        session.state(),
        SessionState::Ready | SessionState::Result(_)
    ) {
        println!("No document is ready. Type `retry` or `reset <file>`.");
        return Ok(());
    }

    match pipeline.answer(question).await {
        Ok(result) => {
            if let Some(id) = session.current_id().map(str::to_string) {
                let mut state = client_state::load(&config.client.state_path)?;
                if state.attach_result(&id, result.clone()) {
                    client_state::save(&config.client.state_path, &state)?;
                }
            }
            session.query_succeeded(result)?;
            if let SessionState::Result(result) = session.state() {
                println!();
                print_result(result, false)?;
                println!();
            }
        }
        Err(e) => session.query_failed(&e.to_string())?,
    }
    Ok(())
}

fn open_history(config: &Config, session: &mut Session, id: &str) -> Result<()> {
    let state = client_state::load(&config.client.state_path)?;
    let Some(item) = state.find(id) else {
        println!("No history entry with id {}", id);
        return Ok(());
    };

    // History is picked from the upload screen; leave a failed upload first.
    if matches!(session.state(), SessionState::Error(_)) {
        session.reset();
    }
    session.open_history(item)?;
    client_state::print_opened(session, item, false)
}
