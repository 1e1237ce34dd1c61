//! Cogitor engine: the orchestration layer between the operator and the
//! LLM backend.
//!
//! One request at a time flows through here: reference extraction,
//! context assembly, prompt construction, the LLM call, response
//! classification, code materialization under the path sandbox, and the
//! build/repair loop. Everything that outlives a request lives in
//! [`Session`].

pub mod assemble;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod prompt;
pub mod session;
pub mod stats;
pub mod store;
pub mod sys;
pub mod websearch;

pub use config::Config;
pub use controller::{
    AutoPilot, DiffReport, FileIssue, GenerationReport, OperatorPrompt, QueryOutcome,
};
pub use error::{EngineError, EngineResult};
pub use session::{LlmBackend, ProviderTriple, RequestScope, Session};
pub use stats::{Statistics, StatsSnapshot};
pub use store::{SessionData, SessionStore, SessionSummary, SESSION_FORMAT_VERSION};
pub use websearch::{detect_language, should_search, SearchLink, SearchResult};

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::controller::{AutoPilot, OperatorPrompt, QueryOutcome};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::session::Session;
}
