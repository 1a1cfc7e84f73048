//! Top-level façade coordinating retrieval, sessions, and routing.
//!
//! An [`Engine`] value only exists after [`Engine::initialize`] has
//! fully built the shared default collection: there is no half-built
//! "not yet ready" state to guard against at call sites. A startup
//! failure (document loading or the very first embedding call) is the
//! one condition treated as fatal — the caller must abort instead of
//! serving queries from a partially built corpus.

use std::sync::Arc;
use std::time::Duration;

use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::index::VectorIndex;
use crate::models::{AnswerResult, ChatTurn, Document, Passage};
use crate::rerank::Reranker;
use crate::retriever::Retriever;
use crate::router::ModelRouter;
use crate::session::ConversationManager;

/// Name of the shared collection built at startup and visible to every
/// session alongside its private collection.
pub const DEFAULT_COLLECTION: &str = "default";

/// Engine tuning knobs that do not belong to any single component.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of passages retrieved per query.
    pub top_k: usize,
    /// Budget for a single backend `generate` call.
    pub generate_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            generate_timeout: Duration::from_secs(120),
        }
    }
}

/// The retrieval orchestration engine.
pub struct Engine {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    sessions: ConversationManager,
    router: ModelRouter,
    options: EngineOptions,
}

impl Engine {
    /// Build the engine and ingest `documents` into the shared default
    /// collection.
    ///
    /// Any failure here is a startup-abort condition: the returned
    /// error means the process must not begin serving queries.
    pub async fn initialize(
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        router: ModelRouter,
        documents: Vec<Document>,
        options: EngineOptions,
    ) -> Result<Self> {
        let index = Arc::new(VectorIndex::new());
        index.create_collection(DEFAULT_COLLECTION)?;
        if !documents.is_empty() {
            let written = index
                .add(DEFAULT_COLLECTION, &documents, embedder.as_ref())
                .await?;
            tracing::info!(written, "built default collection");
        }

        let retriever = Retriever::new(embedder.clone(), index.clone(), reranker);
        let sessions = ConversationManager::new(index.clone());

        Ok(Self {
            embedder,
            index,
            retriever,
            sessions,
            router,
            options,
        })
    }

    /// Answer a question for a session.
    ///
    /// Retrieves top-k passages from the session's collection merged
    /// with the shared default collection, builds a source-tagged
    /// prompt, dispatches to the session's active backend, and appends
    /// the turn to history. Zero retrieved passages degrades to an
    /// ungrounded answer with empty `sources` — never an error. A
    /// backend failure leaves history untouched.
    pub async fn query(&self, session_id: &str, question: &str) -> Result<AnswerResult> {
        let collection = self.sessions.get_or_create(session_id);

        let retrieval = self
            .retriever
            .retrieve_merged(
                &[collection.as_str(), DEFAULT_COLLECTION],
                question,
                self.options.top_k,
            )
            .await?;

        let prompt = build_prompt(question, &retrieval.passages);
        let active = self.sessions.active_backend(session_id)?;
        let backend = self.router.resolve(active.as_deref())?;

        tracing::debug!(
            session_id,
            backend = backend.name(),
            passages = retrieval.passages.len(),
            "dispatching query"
        );

        let answer = tokio::time::timeout(self.options.generate_timeout, backend.generate(&prompt))
            .await
            .map_err(|_| EngineError::Timeout {
                operation: "generate",
                budget: self.options.generate_timeout,
            })??;

        let sources = collect_sources(&retrieval.passages);
        self.sessions.append_turn(session_id, question, &answer)?;

        Ok(AnswerResult { answer, sources })
    }

    /// Start a new conversation: clears the session's history, keeps
    /// its collection and active backend.
    pub fn new_conversation(&self, session_id: &str) -> Result<()> {
        self.sessions.reset(session_id)
    }

    /// Switch the session's answering backend. Fails with
    /// [`EngineError::UnknownBackend`] for unregistered names, leaving
    /// the previous backend active.
    pub fn switch_model(&self, session_id: &str, name: &str) -> Result<()> {
        self.sessions.get_or_create(session_id);
        self.router.set_active(&self.sessions, session_id, name)
    }

    /// Ingest documents into the session's own collection, as opposed
    /// to the shared default — per-session private corpora.
    pub async fn add_documents(&self, session_id: &str, documents: &[Document]) -> Result<usize> {
        let collection = self.sessions.get_or_create(session_id);
        self.index
            .add(&collection, documents, self.embedder.as_ref())
            .await
    }

    /// Distinct document sources visible to the session (its own
    /// collection first, then the shared default), deduplicated in
    /// order of first appearance.
    pub fn document_sources(&self, session_id: &str) -> Result<Vec<String>> {
        let collection = self.sessions.get_or_create(session_id);
        let mut sources = self.index.sources(&collection)?;
        for source in self.index.sources(DEFAULT_COLLECTION)? {
            if !sources.iter().any(|s| s == &source) {
                sources.push(source);
            }
        }
        Ok(sources)
    }

    /// Register (or replace) an answering backend at runtime.
    ///
    /// Names are resolved at call time, so sessions already bound to
    /// `name` pick up the replacement on their next query. This is the
    /// credential-rotation path: rebuild the backend with new
    /// credentials and register it under the same name.
    pub fn register_backend(&self, name: &str, backend: Arc<dyn crate::router::Backend>) {
        self.router.register(name, backend);
    }

    /// Snapshot of the session's conversation history.
    pub fn history(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        self.sessions.history(session_id)
    }
}

/// Build the augmented prompt: the question plus each passage tagged
/// with its source. With no passages the prompt omits context entirely
/// and asks the backend to answer from its own knowledge.
fn build_prompt(question: &str, passages: &[Passage]) -> String {
    if passages.is_empty() {
        return format!(
            "Answer the following question. No supporting documents were found, \
             so answer from general knowledge and say so if you are unsure.\n\n\
             Question: {}",
            question
        );
    }

    let mut prompt = String::from(
        "Answer the question using the context passages below. \
         Cite only information that appears in the context.\n\n",
    );
    for (i, passage) in passages.iter().enumerate() {
        let source = passage.source().unwrap_or("unknown");
        prompt.push_str(&format!("[{}] (source: {})\n{}\n\n", i + 1, source, passage.content));
    }
    prompt.push_str(&format!("Question: {}", question));
    prompt
}

/// Source identifiers of the passages actually used, deduplicated in
/// order of first appearance.
fn collect_sources(passages: &[Passage]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for passage in passages {
        if let Some(source) = passage.source() {
            if !sources.iter().any(|s| s == source) {
                sources.push(source.to_string());
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn passage(content: &str, source: &str, score: f32) -> Passage {
        let mut metadata = BTreeMap::new();
        metadata.insert(crate::models::SOURCE_KEY.to_string(), source.to_string());
        Passage {
            content: content.to_string(),
            metadata,
            score,
        }
    }

    #[test]
    fn prompt_without_passages_omits_context() {
        let prompt = build_prompt("What is the capital of France?", &[]);
        assert!(prompt.contains("No supporting documents"));
        assert!(prompt.contains("What is the capital of France?"));
    }

    #[test]
    fn prompt_tags_each_passage_with_its_source() {
        let passages = vec![
            passage("Paris is the capital of France", "doc1", 0.9),
            passage("Tokyo is the capital of Japan", "doc2", 0.5),
        ];
        let prompt = build_prompt("capital?", &passages);
        assert!(prompt.contains("(source: doc1)"));
        assert!(prompt.contains("(source: doc2)"));
        assert!(prompt.contains("Paris is the capital of France"));
        assert!(prompt.ends_with("Question: capital?"));
    }

    #[test]
    fn sources_dedup_in_first_appearance_order() {
        let passages = vec![
            passage("a", "doc2", 0.9),
            passage("b", "doc1", 0.8),
            passage("c", "doc2", 0.7),
        ];
        assert_eq!(collect_sources(&passages), vec!["doc2", "doc1"]);
    }
}
