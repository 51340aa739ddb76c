//! # docsage
//!
//! Local document ingestion, summarization and retrieval-augmented question
//! answering.
//!
//! Uploads in plain text, Markdown, CSV, HTML, PDF (with OCR for scanned
//! pages), Office formats and raster images are turned into normalized text,
//! split into overlapping chunks, embedded, and stored in SQLite. Questions
//! are answered from the best-matching chunks, with a generative model when
//! one is configured and an extracted passage otherwise.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌──────────┐
//! │ Extractor │──▶│ Chunk+Embed │──▶│  SQLite  │
//! │ PDF/OOXML │   │             │   │ + index  │
//! └───────────┘   └─────────────┘   └────┬─────┘
//!                                        │
//!                    ┌───────────────────┤
//!                    ▼                   ▼
//!               ┌──────────┐       ┌──────────┐
//!               │   CLI    │       │   HTTP   │
//!               └──────────┘       └──────────┘
//! ```
//!
//! Pure pipeline logic (chunking, retrieval, answering, summarization) lives
//! in the `docsage-core` crate; this crate adds I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Format detection and text extraction |
//! | [`embedding`] | Embedding provider backends |
//! | [`generate`] | Generative backends |
//! | [`sqlite_store`] | SQLite `DocumentStore` |
//! | [`service`] | Orchestration used by CLI and server |
//! | [`server`] | HTTP API |
//! | [`db`] / [`migrate`] | Database connection and schema |

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod service;
pub mod sqlite_store;
