//! Document-source collaborator: plain-text files in, [`Document`]s out.
//!
//! The engine only accepts the already-extracted `(content, metadata)`
//! shape; this module is the one place that touches the filesystem.
//! Each file becomes a single document whose `source` metadata is the
//! file's path, used later for citation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::Document;

/// Load each path into one [`Document`]. Fails on the first unreadable
/// file — at startup that is deliberately fatal.
pub async fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        documents.push(load_document(path).await?);
    }
    Ok(documents)
}

async fn load_document(path: &Path) -> Result<Document> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    Ok(Document::new(content, path.display().to_string()))
}
