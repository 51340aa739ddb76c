//! # docsage core
//!
//! Pure pipeline logic for docsage: data models, the error taxonomy,
//! chunking, the embedding trait, the in-memory retriever, answering,
//! summarization and the storage abstraction.
//!
//! This crate does no file, network or database I/O of its own. Concrete
//! extractors, embedding backends, generators and the SQLite store live in
//! the `docsage` application crate and plug in through the traits here.

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod models;
pub mod retriever;
pub mod store;
pub mod summarize;

pub use error::{PipelineError, PipelineResult};
