//! # Ragmill
//!
//! A retrieval-augmented question answering engine with per-session
//! document corpora and switchable model backends.
//!
//! Ragmill embeds a document corpus into an in-memory vector index,
//! retrieves the passages most relevant to a question (cosine similarity
//! with a pluggable rerank pass), and feeds them to an interchangeable
//! language-model backend, maintaining conversational history per
//! session.
//!
//! ## Architecture
//!
//! ```text
//! documents ──▶ Embedder ──▶ VectorIndex          (ingestion)
//!
//! question ──▶ Retriever ──▶ ranked passages
//!                │                  │
//!            Embedder ┐             ▼
//!          VectorIndex ┤      ModelRouter ──▶ active Backend
//!             Reranker ┘            │
//!                                   ▼
//!                          answer + cited sources
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Engine error taxonomy |
//! | [`models`] | Core data types |
//! | [`embedding`] | Embedding capability and remote providers |
//! | [`index`] | In-memory vector index with named collections |
//! | [`rerank`] | Second-pass candidate reordering |
//! | [`retriever`] | Query → top-k passages pipeline |
//! | [`session`] | Session lifecycle and chat history |
//! | [`router`] | Answering backends and per-session routing |
//! | [`engine`] | Top-level façade |
//! | [`loader`] | Plain-text document loading |
//! | [`server`] | HTTP service layer |

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod loader;
pub mod models;
pub mod rerank;
pub mod retriever;
pub mod router;
pub mod server;
pub mod session;
