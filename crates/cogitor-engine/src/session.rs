//! The session value: every piece of state that outlives one request.
//!
//! The conversation history, RAG store, statistics, config, provider
//! triple, and the active-request slot are bundled here and passed
//! explicitly. Two ownership zones: read-mostly config behind its own
//! lock, conversation state behind the history's readers/writer lock.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cogitor_context::{ConversationHistory, RagStore};
use cogitor_patch::PathSandbox;
use cogitor_runtime::{ChatProvider, ChatRequest, LlmClient, ProviderError, ProviderKind};

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::stats::Statistics;
use crate::store::SessionStore;

/// The live provider/model/key selection; may be swapped mid-session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTriple {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
}

/// The transport behind the session's LLM calls. Production uses
/// [`LlmClient`]; tests swap in a scripted double.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn send(
        &self,
        scope: &CancellationToken,
        kind: &ProviderKind,
        req: ChatRequest,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn send(
        &self,
        scope: &CancellationToken,
        kind: &ProviderKind,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        LlmClient::send(self, scope, kind, req).await
    }
}

struct ActiveScope {
    generation: u64,
    token: CancellationToken,
}

pub struct Session {
    pub history: ConversationHistory,
    pub rag: RagStore,
    pub stats: Statistics,
    pub config: RwLock<Config>,
    pub sandbox: PathSandbox,
    pub store: SessionStore,
    provider: Mutex<ProviderTriple>,
    scope_slot: Mutex<Option<ActiveScope>>,
    scope_generation: AtomicU64,
    llm: Box<dyn LlmBackend>,
    pub(crate) http: reqwest::Client,
}

impl Session {
    /// Session rooted at the process working directory with the default
    /// session store.
    pub fn new(
        kind: ProviderKind,
        model: impl Into<String>,
        api_key: Option<String>,
        config: Config,
    ) -> EngineResult<Arc<Self>> {
        let sandbox = PathSandbox::current_dir()?;
        let store = SessionStore::default_location()?;
        Self::with_paths(kind, model, api_key, config, sandbox, store)
    }

    pub fn with_paths(
        kind: ProviderKind,
        model: impl Into<String>,
        api_key: Option<String>,
        config: Config,
        sandbox: PathSandbox,
        store: SessionStore,
    ) -> EngineResult<Arc<Self>> {
        Self::with_backend(
            kind,
            model,
            api_key,
            config,
            sandbox,
            store,
            Box::new(LlmClient::new()),
        )
    }

    pub fn with_backend(
        kind: ProviderKind,
        model: impl Into<String>,
        api_key: Option<String>,
        config: Config,
        sandbox: PathSandbox,
        store: SessionStore,
        backend: Box<dyn LlmBackend>,
    ) -> EngineResult<Arc<Self>> {
        let history = ConversationHistory::with_max_count(config.context_limit);
        Ok(Arc::new(Self {
            history,
            rag: RagStore::new(),
            stats: Statistics::new(),
            config: RwLock::new(config),
            sandbox,
            store,
            provider: Mutex::new(ProviderTriple {
                kind,
                model: model.into(),
                api_key,
            }),
            scope_slot: Mutex::new(None),
            scope_generation: AtomicU64::new(0),
            llm: backend,
            http: reqwest::Client::new(),
        }))
    }

    pub fn working_root(&self) -> &Path {
        self.sandbox.root()
    }

    pub fn provider_triple(&self) -> ProviderTriple {
        self.provider.lock().expect("provider lock poisoned").clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        let mut triple = self.provider.lock().expect("provider lock poisoned");
        triple.model = model.into();
    }

    pub fn set_provider(&self, kind: ProviderKind, model: impl Into<String>, api_key: Option<String>) {
        let mut triple = self.provider.lock().expect("provider lock poisoned");
        triple.kind = kind;
        triple.model = model.into();
        if api_key.is_some() {
            triple.api_key = api_key;
        }
    }

    pub fn config_snapshot(&self) -> Config {
        self.config.read().expect("config lock poisoned").clone()
    }

    pub fn update_config<F: FnOnce(&mut Config) -> EngineResult<()>>(
        &self,
        apply: F,
    ) -> EngineResult<()> {
        let mut config = self.config.write().expect("config lock poisoned");
        apply(&mut config)
    }

    /// Install a fresh request scope, cancelling the previous one. The
    /// returned guard clears the slot on drop.
    pub fn begin_request(self: &Arc<Self>) -> RequestScope {
        let generation = self.scope_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let mut slot = self.scope_slot.lock().expect("scope lock poisoned");
        if let Some(previous) = slot.take() {
            debug!("cancelling previous request scope");
            previous.token.cancel();
        }
        *slot = Some(ActiveScope {
            generation,
            token: token.clone(),
        });
        RequestScope {
            session: Arc::clone(self),
            generation,
            token,
        }
    }

    /// Trip the active request's token, if any. Returns whether there was
    /// one to cancel.
    pub fn cancel_active_request(&self) -> bool {
        let mut slot = self.scope_slot.lock().expect("scope lock poisoned");
        match slot.take() {
            Some(active) => {
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn has_active_request(&self) -> bool {
        self.scope_slot
            .lock()
            .expect("scope lock poisoned")
            .is_some()
    }

    fn clear_scope(&self, generation: u64) {
        let mut slot = self.scope_slot.lock().expect("scope lock poisoned");
        if slot
            .as_ref()
            .is_some_and(|active| active.generation == generation)
        {
            *slot = None;
        }
    }

    /// Send one message to the current provider, timing it under `kind`.
    pub async fn send_llm(
        &self,
        scope: &CancellationToken,
        message: &str,
        kind: &str,
    ) -> EngineResult<String> {
        let triple = self.provider_triple();
        let request = ChatRequest {
            message: message.to_string(),
            model: triple.model,
            api_key: triple.api_key,
        };
        let started = Instant::now();
        let result = self.llm.send(scope, &triple.kind, request).await;
        self.stats.record_request(started.elapsed(), kind);
        result.map_err(EngineError::from)
    }
}

/// Session is a chat provider in its own right, so the repair loop talks
/// to whatever provider is currently selected.
#[async_trait]
impl ChatProvider for Session {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn send(
        &self,
        scope: &CancellationToken,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        let kind = self.provider_triple().kind;
        let started = Instant::now();
        let result = self.llm.send(scope, &kind, req).await;
        self.stats.record_request(started.elapsed(), "llm");
        result
    }
}

/// Guard for one in-flight request. Owns the cancellation token; clears
/// the session's slot when dropped, whatever the outcome.
pub struct RequestScope {
    session: Arc<Session>,
    generation: u64,
    token: CancellationToken,
}

impl RequestScope {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.session.clear_scope(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_session(dir: &TempDir) -> Arc<Session> {
        Session::with_paths(
            ProviderKind::Ollama,
            "test-model",
            None,
            Config::default(),
            PathSandbox::new(dir.path()).unwrap(),
            SessionStore::new(dir.path().join("sessions")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn begin_request_cancels_the_previous_scope() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);

        let first = session.begin_request();
        let first_token = first.token().clone();
        assert!(!first_token.is_cancelled());

        let second = session.begin_request();
        assert!(first_token.is_cancelled());
        assert!(!second.token().is_cancelled());
        assert!(session.has_active_request());
    }

    #[tokio::test]
    async fn dropping_the_scope_clears_the_slot() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        {
            let _scope = session.begin_request();
            assert!(session.has_active_request());
        }
        assert!(!session.has_active_request());
    }

    #[tokio::test]
    async fn stale_scope_drop_does_not_clear_a_newer_one() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        let first = session.begin_request();
        let second = session.begin_request();
        drop(first);
        assert!(session.has_active_request());
        drop(second);
        assert!(!session.has_active_request());
    }

    #[tokio::test]
    async fn cancel_active_request_trips_and_empties_the_slot() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        let scope = session.begin_request();

        assert!(session.cancel_active_request());
        assert!(scope.is_cancelled());
        assert!(!session.cancel_active_request());
    }

    #[tokio::test]
    async fn provider_triple_swaps_live() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.set_provider(
            ProviderKind::OpenRouter,
            "other-model",
            Some("key".to_string()),
        );

        let triple = session.provider_triple();
        assert_eq!(triple.kind, ProviderKind::OpenRouter);
        assert_eq!(triple.model, "other-model");
        assert_eq!(triple.api_key.as_deref(), Some("key"));

        // A model-only change keeps the key.
        session.set_model("third");
        assert_eq!(session.provider_triple().api_key.as_deref(), Some("key"));
    }
}
