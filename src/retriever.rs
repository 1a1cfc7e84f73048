//! Retrieval pipeline: embed the query, gather candidates from the
//! index, rerank, truncate to top-k.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{ScoredEntry, VectorIndex};
use crate::models::RetrievalResult;
use crate::rerank::Reranker;

/// Composes the embedding capability, the vector index, and a rerank
/// policy into a single "query in, top-k passages out" operation.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    reranker: Arc<dyn Reranker>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker,
        }
    }

    /// Retrieve the top-k passages for `query` from a single collection.
    ///
    /// Zero candidates is a successful, degraded outcome: the caller
    /// falls back to an ungrounded-answer path rather than failing the
    /// whole query. Embedding failures propagate.
    pub async fn retrieve(&self, collection: &str, query: &str, k: usize) -> Result<RetrievalResult> {
        self.retrieve_merged(&[collection], query, k).await
    }

    /// Retrieve the top-k passages across several collections.
    ///
    /// The query is embedded once; up to `k` candidates are gathered
    /// from each collection, then reranked together and truncated to
    /// `k`. Used by the engine to merge a session's private corpus with
    /// the shared default corpus.
    pub async fn retrieve_merged(
        &self,
        collections: &[&str],
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        let query_vec = self.embedder.embed(query).await?;

        let mut candidates: Vec<ScoredEntry> = Vec::new();
        for collection in collections {
            candidates.extend(self.index.query(collection, &query_vec, k)?);
        }

        if candidates.is_empty() {
            tracing::debug!(query, "no candidates; degrading to ungrounded answer");
            return Ok(RetrievalResult::default());
        }

        let mut passages = self.reranker.rerank(query, candidates);
        passages.truncate(k);

        tracing::debug!(query, returned = passages.len(), "retrieval complete");
        Ok(RetrievalResult { passages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::Document;
    use crate::rerank::SimilarityReranker;
    use async_trait::async_trait;

    /// Unit-axis embedder: "a" → x, "b" → y, everything else fails.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            match text {
                "a" => Ok(vec![1.0, 0.0]),
                "b" => Ok(vec![0.0, 1.0]),
                "ab" => Ok(vec![1.0, 1.0]),
                other => Err(EngineError::Embedding(format!("no axis for: {}", other))),
            }
        }
    }

    async fn retriever_with(documents: &[Document]) -> Retriever {
        let index = Arc::new(VectorIndex::new());
        index.create_collection("c").unwrap();
        let embedder = Arc::new(AxisEmbedder);
        index.add("c", documents, embedder.as_ref()).await.unwrap();
        Retriever::new(embedder, index, Arc::new(SimilarityReranker))
    }

    #[tokio::test]
    async fn returns_at_most_k_passages() {
        let retriever = retriever_with(&[
            Document::new("a", "s1"),
            Document::new("b", "s2"),
            Document::new("ab", "s3"),
        ])
        .await;

        let result = retriever.retrieve("c", "a", 2).await.unwrap();
        assert_eq!(result.passages.len(), 2);
        assert_eq!(result.passages[0].content, "a");
    }

    #[tokio::test]
    async fn fewer_than_k_only_when_collection_is_smaller() {
        let retriever = retriever_with(&[Document::new("a", "s1")]).await;
        let result = retriever.retrieve("c", "a", 5).await.unwrap();
        assert_eq!(result.passages.len(), 1);
    }

    #[tokio::test]
    async fn empty_collection_is_success_not_error() {
        let retriever = retriever_with(&[]).await;
        let result = retriever.retrieve("c", "a", 3).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let retriever = retriever_with(&[Document::new("a", "s1")]).await;
        let err = retriever.retrieve("c", "unmapped", 3).await.unwrap_err();
        assert!(matches!(err, EngineError::Embedding(_)));
    }
}
