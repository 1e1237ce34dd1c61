//! Runtime abstractions for LLM providers.
//!
//! The gateway is provider-polymorphic: `ollama`, `openrouter`,
//! `pollinations`, `phind` (SSE), or any bare URL treated as an
//! OpenAI-compatible endpoint. Every call takes the request scope's
//! cancellation token and composes it with a per-call deadline; whichever
//! fires first wins.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod catalog;
pub mod extract;
pub mod providers;

pub use catalog::{list_models, ModelEntry};
pub use extract::extract_content;
pub use providers::{OpenAiCompatProvider, PhindProvider, PollinationsProvider};

/// Default per-call deadline for remote providers.
pub const REMOTE_DEADLINE: Duration = Duration::from_secs(240);

/// Deadline for the local ollama endpoint, which may be loading a model.
pub const LOCAL_DEADLINE: Duration = Duration::from_secs(480);

const OLLAMA_ENDPOINT: &str = "http://localhost:11434/v1/chat/completions";
const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const POLLINATIONS_ENDPOINT: &str = "https://text.pollinations.ai/openai";
const PHIND_ENDPOINT: &str = "https://https.extension.phind.com/agent/";

/// The closed set of provider kinds. A bare URL is an OpenAI-compatible
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenRouter,
    Pollinations,
    Phind,
    Endpoint(String),
}

impl ProviderKind {
    /// Parse a provider name or URL. Unknown non-URL names are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ollama" => Some(ProviderKind::Ollama),
            "openrouter" => Some(ProviderKind::OpenRouter),
            "pollinations" => Some(ProviderKind::Pollinations),
            "phind" => Some(ProviderKind::Phind),
            other if is_http_url(other) => Some(ProviderKind::Endpoint(other.to_string())),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Pollinations => "pollinations",
            ProviderKind::Phind => "phind",
            ProviderKind::Endpoint(url) => url,
        }
    }

    pub fn deadline(&self) -> Duration {
        match self {
            ProviderKind::Ollama => LOCAL_DEADLINE,
            _ => REMOTE_DEADLINE,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn is_http_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://"))
        && s.splitn(3, '/').nth(2).is_some_and(|host| !host.is_empty())
}

/// One chat call: the assembled prompt plus routing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("empty response body")]
    EmptyResponse,
    #[error("request cancelled")]
    Cancelled,
    #[error("deadline of {seconds}s exceeded")]
    Timeout { seconds: u64 },
    #[error("unsupported provider: {0}")]
    Unsupported(String),
    #[error("mock provider has no queued response")]
    MockQueueEmpty,
}

impl ProviderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send one message and return the extracted reply text. Honors the
    /// scope before the network call and aborts the request when the scope
    /// trips mid-flight.
    async fn send(
        &self,
        scope: &CancellationToken,
        req: ChatRequest,
    ) -> Result<String, ProviderError>;
}

/// Compose the scope token with a per-call deadline around a provider
/// future. Dropping the future aborts the underlying HTTP request.
pub async fn with_scope<F, T>(
    scope: &CancellationToken,
    deadline: Duration,
    fut: F,
) -> Result<T, ProviderError>
where
    F: std::future::Future<Output = Result<T, ProviderError>>,
{
    if scope.is_cancelled() {
        return Err(ProviderError::Cancelled);
    }
    tokio::select! {
        _ = scope.cancelled() => Err(ProviderError::Cancelled),
        outcome = tokio::time::timeout(deadline, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                seconds: deadline.as_secs(),
            }),
        },
    }
}

/// Dispatches chat calls to the provider named by `ProviderKind`.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    pub async fn send(
        &self,
        scope: &CancellationToken,
        kind: &ProviderKind,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        match kind {
            ProviderKind::Ollama => {
                OpenAiCompatProvider::new(self.http.clone(), OLLAMA_ENDPOINT, LOCAL_DEADLINE)
                    .send(scope, req)
                    .await
            }
            ProviderKind::OpenRouter => {
                let base = std::env::var("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|_| OPENROUTER_API_BASE.to_string());
                let endpoint = format!("{}/chat/completions", base.trim_end_matches('/'));
                let req = fall_back_to_env_key(req, "OPENROUTER_API_KEY");
                OpenAiCompatProvider::new(self.http.clone(), endpoint, REMOTE_DEADLINE)
                    .send(scope, req)
                    .await
            }
            ProviderKind::Pollinations => {
                let req = fall_back_to_env_key(req, "POLLINATIONS_API_KEY");
                PollinationsProvider::new(self.http.clone(), POLLINATIONS_ENDPOINT)
                    .send(scope, req)
                    .await
            }
            ProviderKind::Phind => {
                let req = fall_back_to_env_key(req, "PHIND_API_KEY");
                PhindProvider::new(self.http.clone(), PHIND_ENDPOINT)
                    .send(scope, req)
                    .await
            }
            ProviderKind::Endpoint(url) => {
                OpenAiCompatProvider::new(self.http.clone(), url.clone(), REMOTE_DEADLINE)
                    .send(scope, req)
                    .await
            }
        }
    }
}

fn fall_back_to_env_key(mut req: ChatRequest, var: &str) -> ChatRequest {
    if req.api_key.is_none() {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                req.api_key = Some(key);
            }
        }
    }
    req
}

/// Authorization header value for an API key. Keys with the `sn-` prefix
/// are sent verbatim, everything else is Bearer-prefixed.
pub fn authorization_value(api_key: &str) -> String {
    if api_key.starts_with("sn-") {
        api_key.to_string()
    } else {
        format!("Bearer {api_key}")
    }
}

/// Test double: replies are queued and prompts are recorded.
#[derive(Debug, Default)]
pub struct MockProvider {
    queue: Mutex<VecDeque<Result<String, ProviderError>>>,
    seen: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, result: Result<String, ProviderError>) {
        self.queue
            .lock()
            .expect("mock queue poisoned")
            .push_back(result);
    }

    /// Prompts received so far, in call order.
    pub fn seen_prompts(&self) -> Vec<String> {
        self.seen.lock().expect("mock seen poisoned").clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(
        &self,
        scope: &CancellationToken,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        if scope.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.seen
            .lock()
            .expect("mock seen poisoned")
            .push(req.message);
        self.queue
            .lock()
            .expect("mock queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))
    }
}
