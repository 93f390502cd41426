// Chat-completion backends
//
// Every provider the proxy talks to is reached through the `ChatBackend` trait:
// - OpenAI: any OpenAI-compatible `chat/completions` endpoint (DeepSeek, Tencent LKEAP, Aliyun DashScope, ...)
// The registry maps the ids used in `api_priority` to shared backend handles.

pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::error::{Result, HonyakuError};

pub use openai::OpenAiBackend;

/// Lazy, finite, non-restartable sequence of generated text fragments.
pub type FragmentStream = BoxStream<'static, std::result::Result<String, BackendError>>;

/// Marker an OpenAI-compatible provider puts in errors when its content audit rejects a request.
pub const CONTENT_REJECTION_MARKER: &str = "data_inspection_failed";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("content rejected by provider: {0}")]
    ContentRejected(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("empty response")]
    EmptyResponse,
}

impl BackendError {
    /// Classify a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 {
            Self::RateLimited(body)
        } else if body.contains(CONTENT_REJECTION_MARKER) {
            Self::ContentRejected(body)
        } else {
            Self::Api { status, body }
        }
    }

    /// Classify an error payload delivered inside the event stream.
    pub fn from_stream_payload(message: String) -> Self {
        if message.contains(CONTENT_REJECTION_MARKER) {
            Self::ContentRejected(message)
        } else {
            Self::Stream(message)
        }
    }

    /// Transport failure; the whole source chain is kept so TLS causes stay visible.
    /// The request URL is dropped so an endpoint name cannot pose as a TLS cause.
    pub fn from_transport(error: reqwest::Error) -> Self {
        let error = error.without_url();
        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Connection(message)
    }

    pub fn is_certificate_failure(&self) -> bool {
        match self {
            Self::Connection(message) => {
                let lower = message.to_lowercase();
                lower.contains("ssl") || lower.contains("certificate")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

/// One streaming chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
    pub params: SamplingParams,
}

/// Trait for streaming text generation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a generation and return its fragments. Errors raised before the
    /// first fragment (status codes, transport) are returned directly; errors
    /// after that arrive as stream items.
    async fn stream_generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<FragmentStream, BackendError>;
}

/// A configured backend: the client plus the model it is asked for.
#[derive(Clone)]
pub struct BackendHandle {
    pub id: String,
    pub model: String,
    pub client: Arc<dyn ChatBackend>,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("id", &self.id)
            .field("model", &self.model)
            .finish()
    }
}

/// Backends addressable by the ids used in `api_priority`.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    handles: HashMap<String, BackendHandle>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one OpenAI-compatible backend per `[backends.<id>]` entry, sharing a single HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HonyakuError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let mut registry = Self::new();
        for (id, backend) in &config.backends {
            if backend.endpoint.trim().is_empty() {
                return Err(HonyakuError::Config(format!("backends.{}.endpoint is empty", id)));
            }
            let openai = OpenAiBackend::new(client.clone(), backend.endpoint.clone(), backend.api_key.clone());
            registry.insert(id.clone(), backend.model.clone(), Arc::new(openai));
        }

        info!("Configured {} backend(s): {:?}", registry.len(), registry.ids());
        Ok(registry)
    }

    pub fn insert(&mut self, id: impl Into<String>, model: impl Into<String>, client: Arc<dyn ChatBackend>) {
        let id = id.into();
        self.handles.insert(
            id.clone(),
            BackendHandle {
                id,
                model: model.into(),
                client,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&BackendHandle> {
        self.handles.get(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handles.keys().map(|k| k.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            BackendError::from_status(429, "slow down".to_string()),
            BackendError::RateLimited(_)
        ));
        assert!(matches!(
            BackendError::from_status(
                400,
                r#"{"error":{"code":"data_inspection_failed","message":"Input data may contain inappropriate content."}}"#
                    .to_string()
            ),
            BackendError::ContentRejected(_)
        ));
        assert_eq!(
            BackendError::from_status(500, "boom".to_string()),
            BackendError::Api { status: 500, body: "boom".to_string() }
        );
    }

    #[test]
    fn test_certificate_failure_detection() {
        let tls = BackendError::Connection(
            "error sending request: error trying to connect: certificate verify failed".to_string(),
        );
        assert!(tls.is_certificate_failure());
        assert!(BackendError::Connection("SSL handshake aborted".to_string()).is_certificate_failure());
        assert!(!BackendError::Connection("connection refused".to_string()).is_certificate_failure());
        assert!(!BackendError::Stream("ssl".to_string()).is_certificate_failure());
    }

    #[test]
    fn test_registry_from_config() {
        let config = Config::default();
        let registry = BackendRegistry::from_config(&config).unwrap();
        assert_eq!(registry.ids(), vec!["deepseek"]);
        assert_eq!(registry.get("deepseek").unwrap().model, "deepseek-chat");
        assert!(registry.get("ali").is_none());
    }
}
