//! Completion provider capability and registry
//!
//! The engine only depends on [`ProviderAdapter`]; every backend implements it
//! once and is registered by name at startup.

mod openai_compat;
mod sanitize;

pub use openai_compat::OpenAiCompatibleProvider;
pub use sanitize::sanitize_error_text;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::recovery::classifier::ProviderError;

/// Unclassified failure returned by an adapter
#[derive(Debug, Clone)]
pub enum RawProviderError {
    /// Connect or read timeout
    Timeout(String),
    /// Non-success HTTP response
    Status {
        status: u16,
        headers: HeaderMap,
        body: String,
    },
    /// Transport failure that is not a timeout (DNS, refused, reset...)
    Transport(String),
    /// Adapter already knows the category
    Classified(ProviderError),
    /// Anything else (bad payload, unexpected response shape)
    Other(String),
}

impl RawProviderError {
    pub fn status(status: u16, headers: HeaderMap, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            headers,
            body: body.into(),
        }
    }
}

impl fmt::Display for RawProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::Status { status, body, .. } => write!(f, "HTTP {}: {}", status, body),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Classified(err) => write!(f, "{}", err),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<reqwest::Error> for RawProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Other(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Optional generation parameters passed through to the backend
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    /// Structured-output directive, e.g. `{"type": "json_object"}`
    pub response_format: Option<Value>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// A single completion backend
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry key; matches `Model::provider`
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, RawProviderError>;

    /// Cheap liveness check, never errors
    async fn health_check(&self) -> bool;
}

/// Name → adapter lookup, built once at startup
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build OpenAI-compatible adapters for every provider entry.
    ///
    /// Entries whose credential is missing are skipped, which is what makes a
    /// provider "unconfigured" for the candidate selector.
    pub fn from_configs(configs: &[ProviderConfig]) -> Self {
        let mut registry = Self::new();
        for config in configs {
            match OpenAiCompatibleProvider::from_config(config) {
                Ok(provider) => registry.register(Arc::new(provider)),
                Err(e) => {
                    tracing::warn!(provider = %config.name, error = %e, "provider_not_configured");
                }
            }
        }
        registry
    }

    /// Register an adapter under its own name, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn ProviderAdapter>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(name).cloned()
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
