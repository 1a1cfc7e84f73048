//! Core data types that flow through the retrieval and answering pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key that carries the citation identifier for a document.
pub const SOURCE_KEY: &str = "source";

/// A plain-text document ready for ingestion.
///
/// Produced by an external document-source collaborator (see
/// [`loader`](crate::loader)); the engine is agnostic to file formats
/// and accepts only this already-extracted shape. Immutable once
/// ingested. `metadata` must include a `source` entry used for citation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// The citation identifier, if the document carries one.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A retrieved passage with its final relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    /// Final score after reranking. Higher is more relevant.
    pub score: f32,
}

impl Passage {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// Ordered passages returned by the retriever, descending by score,
/// at most the requested `k`. Empty when nothing relevant was indexed —
/// that is a successful, degraded outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub passages: Vec<Passage>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// The answer to a question together with the citation identifiers of
/// the passages that grounded it, deduplicated in order of first
/// appearance.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<String>,
}

/// One completed question/answer exchange in a session's history.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}
