//! In-memory vector index: a process-wide registry of named collections.
//!
//! Each collection is an isolated set of `(id, embedding, content,
//! metadata)` entries scoped to one session (plus the shared default
//! collection built at startup). Search is brute-force cosine similarity
//! over the collection's vectors.
//!
//! # Concurrency
//!
//! Writes to a single collection are serialized behind a per-collection
//! async mutex, held across the whole embed-and-append loop so that id
//! assignment stays unique and gap-free. Reads take a short `RwLock`
//! snapshot and may run concurrently with each other; a query racing an
//! ingestion is not guaranteed to observe the in-flight batch.
//!
//! Nothing here persists across process restarts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{EngineError, Result};
use crate::models::{Document, SOURCE_KEY};

/// One indexed document. Owned exclusively by the collection that
/// created it; `id` is unique within the collection and never reused.
#[derive(Debug, Clone)]
struct IndexedEntry {
    id: String,
    embedding: Vec<f32>,
    content: String,
    metadata: BTreeMap<String, String>,
}

/// A similarity-search candidate: entry content plus its raw cosine
/// score against the query vector.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub id: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    /// Raw cosine similarity. Higher is more similar.
    pub similarity: f32,
}

struct Collection {
    /// Serializes ingestion so `doc_<n>` ids stay gap-free.
    write_gate: Mutex<()>,
    entries: RwLock<Vec<IndexedEntry>>,
}

impl Collection {
    fn new() -> Self {
        Self {
            write_gate: Mutex::new(()),
            entries: RwLock::new(Vec::new()),
        }
    }
}

/// Process-wide registry of named collections.
pub struct VectorIndex {
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new, empty collection.
    ///
    /// Fails with [`EngineError::DuplicateCollection`] if the name is
    /// already taken.
    pub fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(name) {
            return Err(EngineError::DuplicateCollection(name.to_string()));
        }
        collections.insert(name.to_string(), Arc::new(Collection::new()));
        Ok(())
    }

    /// Create the collection if it does not exist yet. The
    /// "ensure exists" reading of a duplicate create is success.
    pub fn ensure_collection(&self, name: &str) {
        match self.create_collection(name) {
            Ok(()) | Err(EngineError::DuplicateCollection(_)) => {}
            Err(_) => unreachable!("create_collection only fails with DuplicateCollection"),
        }
    }

    fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::CollectionNotFound(name.to_string()))
    }

    /// Ingest documents: one embedding per document, ids assigned as
    /// `doc_<n>` by ordinal position within the collection.
    ///
    /// If an embedding call fails mid-batch, the error propagates and
    /// the entries written before the failing document remain visible.
    /// There is no atomic rollback; callers that need all-or-nothing
    /// ingestion must stage it themselves.
    ///
    /// Returns the number of entries written.
    pub async fn add(
        &self,
        name: &str,
        documents: &[Document],
        embedder: &dyn Embedder,
    ) -> Result<usize> {
        let collection = self.collection(name)?;
        let _gate = collection.write_gate.lock().await;

        let mut written = 0;
        for doc in documents {
            let embedding = embedder.embed(&doc.content).await?;
            if embedding.len() != embedder.dims() {
                return Err(EngineError::Embedding(format!(
                    "embedder returned {} dims, expected {}",
                    embedding.len(),
                    embedder.dims()
                )));
            }
            let mut entries = collection.entries.write().unwrap();
            let id = format!("doc_{}", entries.len());
            entries.push(IndexedEntry {
                id,
                embedding,
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
            });
            written += 1;
        }

        tracing::debug!(collection = name, written, "ingested documents");
        Ok(written)
    }

    /// Return up to `k` entries nearest to `query_vec` by cosine
    /// similarity, descending. An empty collection yields an empty
    /// vec, not an error.
    pub fn query(&self, name: &str, query_vec: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        let collection = self.collection(name)?;
        let entries = collection.entries.read().unwrap();

        let mut candidates: Vec<ScoredEntry> = entries
            .iter()
            .map(|entry| ScoredEntry {
                id: entry.id.clone(),
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                similarity: cosine_similarity(query_vec, &entry.embedding),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        Ok(candidates)
    }

    /// Distinct `source` metadata values in the collection, in order of
    /// first ingestion.
    pub fn sources(&self, name: &str) -> Result<Vec<String>> {
        let collection = self.collection(name)?;
        let entries = collection.entries.read().unwrap();

        let mut seen = Vec::new();
        for entry in entries.iter() {
            if let Some(source) = entry.metadata.get(SOURCE_KEY) {
                if !seen.iter().any(|s| s == source) {
                    seen.push(source.clone());
                }
            }
        }
        Ok(seen)
    }

    /// Number of entries in the collection.
    pub fn len(&self, name: &str) -> Result<usize> {
        let collection = self.collection(name)?;
        let len = collection.entries.read().unwrap().len();
        Ok(len)
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}
