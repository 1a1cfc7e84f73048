use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub backends: BackendsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Paths of the plain-text documents loaded into the shared default
/// collection at startup.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DocumentsConfig {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of passages to return per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Rerank policy: `"similarity"` or `"keyword-overlap"`.
    #[serde(default = "default_reranker")]
    pub reranker: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            reranker: default_reranker(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_reranker() -> String {
    "similarity".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` or `"ollama"`.
    pub provider: String,
    pub model: String,
    pub dims: usize,
    /// Base URL for the Ollama provider. Defaults to the local daemon.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendsConfig {
    /// Backend used by sessions that never switched models.
    pub default: String,
    #[serde(default)]
    pub gemini: Option<GeminiConfig>,
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
    /// Budget for a single `generate` call.
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
}

fn default_generate_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.retrieval.reranker.as_str() {
        "similarity" | "keyword-overlap" => {}
        other => anyhow::bail!(
            "Unknown reranker: '{}'. Must be similarity or keyword-overlap.",
            other
        ),
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }

    // The default backend must have a configuration block, otherwise
    // every query would fail at resolve time.
    let default_configured = match config.backends.default.as_str() {
        "gemini" => config.backends.gemini.is_some(),
        "ollama" => config.backends.ollama.is_some(),
        other => anyhow::bail!(
            "Unknown default backend: '{}'. Must be gemini or ollama.",
            other
        ),
    };
    if !default_configured {
        anyhow::bail!(
            "backends.default is '{}' but no [backends.{}] section is configured",
            config.backends.default,
            config.backends.default
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragmill.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    const MINIMAL: &str = r#"
[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768

[backends]
default = "ollama"

[backends.ollama]
model = "llama3.1"
"#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let (_dir, path) = write_config(MINIMAL);
        let config = load_config(&path).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.reranker, "similarity");
        assert_eq!(config.embedding.max_retries, 5);
        assert_eq!(config.server.bind, "127.0.0.1:3001");
        assert!(config.documents.paths.is_empty());
    }

    #[test]
    fn rejects_zero_top_k() {
        let content = format!("{}\n[retrieval]\ntop_k = 0\n", MINIMAL);
        let (_dir, path) = write_config(&content);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let content = MINIMAL.replace("provider = \"ollama\"", "provider = \"chroma\"");
        let (_dir, path) = write_config(&content);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_default_backend_without_section() {
        let content = MINIMAL.replace("default = \"ollama\"", "default = \"gemini\"");
        let (_dir, path) = write_config(&content);
        assert!(load_config(&path).is_err());
    }
}
