//! # Doco
//!
//! Upload a document, then ask questions about it.
//!
//! Doco extracts text from an uploaded PDF, image or office document,
//! splits it into overlapping chunks, embeds them, and stores them in SQLite
//! with a 25-minute TTL. Questions are answered by retrieval-augmented
//! generation over whatever chunks are still live.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────────────┐   ┌──────────────┐
//! │ Document │──▶│ Extract → Chunk → Embed │──▶│ SQLite (TTL) │
//! └──────────┘   └────────────────────────┘   └──────┬───────┘
//!                                                    │ vector search
//!                        ┌───────────────────────────┤
//!                        ▼                           ▼
//!                   ┌──────────┐               ┌──────────┐
//!                   │   CLI    │               │   HTTP   │
//!                   │  (doco)  │               │  (axum)  │
//!                   └──────────┘               └──────────┘
//! ```
//!
//! The pipeline, traits and client state live in `doco-core`. This crate
//! supplies the adapters (Gemini, OpenAI, Ollama, fastembed, local
//! extraction, SQLite) and the two surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! doco init
//! doco ingest ./contract.pdf
//! doco ask "When does the lease end?"
//! doco serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | Chunk store with TTL and vector search |
//! | [`gemini`] | Gemini extraction, embedding and generation |
//! | [`embedding`] | Embedder selection, OpenAI / Ollama / fastembed |
//! | [`extract`] | Offline text extraction |
//! | [`app`] | Builds the pipeline from configuration |
//! | [`server`] | HTTP API |

pub mod app;
pub mod ask;
pub mod chat;
pub mod client_state;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod gemini;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod stats;
