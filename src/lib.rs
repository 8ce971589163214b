//! # hwrag: retrieval-augmented answers over hardware documents
//!
//! Ingests CPU benchmark tables and hardware guides into a persisted vector
//! collection, then answers natural-language questions from the retrieved
//! context through a generation backend, returning the sources it used.
//!
//! ## Architecture
//!
//! - **[`loaders`]**: CSV rows, PDF pages and text files as [`document::Document`]s
//! - **[`chunker`]**: overlapping, boundary-aware splitting
//! - **[`embedder`]**: text embedding (Ollama HTTP, local ONNX MiniLM, mock)
//! - **[`db`]**: SQLite + sqlite-vec collections, filtered cosine search
//! - **[`ingest`]**: chunk → embed → add, with a per-document report
//! - **[`retriever`]** / **[`composer`]**: the query path
//! - **[`generator`]**: generation backend (Ollama HTTP, mock)
//! - **[`backend`]**: timeout, bounded retry and cancellation for backend calls
//! - **[`mcp`]**: MCP server exposing `answer`, `retrieve`, `list_collections`

pub mod backend;
pub mod chunker;
pub mod composer;
pub mod config;
pub mod db;
pub mod document;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod loaders;
pub mod mcp;
pub mod retriever;

pub use error::{RagError, Result};
