//! Answering backends and per-session backend routing.
//!
//! A [`Backend`] is an interchangeable answering capability: prompt in,
//! text out. The [`ModelRouter`] holds the registered backends and the
//! fallback default; sessions store only the *name* of their active
//! backend and names are resolved at call time, so re-registering a
//! backend (e.g. after rotating credentials) takes effect immediately
//! for in-flight sessions.
//!
//! Concrete backends:
//! - **[`GeminiBackend`]** — Google Generative Language API (`generateContent`).
//! - **[`OllamaBackend`]** — a local Ollama instance's `/api/generate` endpoint.
//!
//! Both share the embedding providers' retry strategy (backoff on
//! 429/5xx/network errors) and surface failures as
//! [`EngineError::Backend`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::config::{BackendsConfig, GeminiConfig, OllamaConfig};
use crate::embedding::{build_client, post_json_with_retry};
use crate::error::{EngineError, Result};
use crate::session::ConversationManager;

/// The answering capability. Registration does not validate
/// reachability; an unreachable backend surfaces lazily on the next
/// `generate` call.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the backend's registered name (e.g. `"gemini"`).
    fn name(&self) -> &str;
    /// Produce an answer for the augmented prompt. May fail transiently
    /// or reject due to quota/auth.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Registry of answering backends plus the configured default.
pub struct ModelRouter {
    backends: RwLock<HashMap<String, Arc<dyn Backend>>>,
    default: String,
}

impl ModelRouter {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            default: default.into(),
        }
    }

    /// Register a backend under a name. Idempotent: re-registering a
    /// name replaces the implementation, which is how credential
    /// rotation is done without restarting.
    pub fn register(&self, name: &str, backend: Arc<dyn Backend>) {
        let replaced = self
            .backends
            .write()
            .unwrap()
            .insert(name.to_string(), backend)
            .is_some();
        tracing::info!(backend = name, replaced, "registered backend");
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.backends.read().unwrap().contains_key(name)
    }

    /// Switch the session's active backend.
    ///
    /// Fails with [`EngineError::UnknownBackend`] if `name` was never
    /// registered; the session's active backend is left unchanged in
    /// that case.
    pub fn set_active(
        &self,
        sessions: &ConversationManager,
        session_id: &str,
        name: &str,
    ) -> Result<()> {
        if !self.is_registered(name) {
            return Err(EngineError::UnknownBackend(name.to_string()));
        }
        sessions.set_active_backend(session_id, name)?;
        tracing::info!(session_id, backend = name, "switched active backend");
        Ok(())
    }

    /// Resolve a backend by name, falling back to the configured
    /// default when the session has none set.
    pub fn resolve(&self, active: Option<&str>) -> Result<Arc<dyn Backend>> {
        let name = active.unwrap_or(&self.default);
        self.backends
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownBackend(name.to_string()))
    }
}

/// Build a router with every backend configured in `[backends]`.
pub fn create_router(config: &BackendsConfig) -> Result<ModelRouter> {
    let router = ModelRouter::new(&config.default);
    if let Some(gemini) = &config.gemini {
        router.register("gemini", Arc::new(GeminiBackend::new(gemini)?));
    }
    if let Some(ollama) = &config.ollama {
        router.register("ollama", Arc::new(OllamaBackend::new(ollama)?));
    }
    Ok(router)
}

// ============ Gemini Backend ============

/// Backend calling the Google Generative Language API.
///
/// Sends `POST /v1beta/models/{model}:generateContent` with the API key
/// from the `GEMINI_API_KEY` environment variable.
pub struct GeminiBackend {
    model: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| EngineError::Backend("GEMINI_API_KEY not set".to_string()))?;
        Self::with_api_key(config, api_key)
    }

    /// Build the backend with an explicit key instead of the
    /// environment. Used by the key-registration endpoint to rotate
    /// credentials at runtime.
    pub fn with_api_key(config: &GeminiConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs).map_err(EngineError::Backend)?,
        })
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        let json = post_json_with_retry(&self.client, &url, &[], &body, self.max_retries, "Gemini")
            .await
            .map_err(EngineError::Backend)?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    json.get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|candidate| candidate.pointer("/content/parts/0/text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Backend("invalid Gemini response: missing text".to_string()))
}

// ============ Ollama Backend ============

/// Backend calling a local Ollama instance.
///
/// Sends `POST /api/generate` with `stream: false` on the configured
/// URL (default: `http://localhost:11434`).
pub struct OllamaBackend {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs).map_err(EngineError::Backend)?,
        })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url),
            &[],
            &body,
            self.max_retries,
            "Ollama generate",
        )
        .await
        .map_err(EngineError::Backend)?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::Backend("invalid Ollama response: missing response field".to_string())
        })
}
