//! The engine-level error taxonomy.
//!
//! Everything inside a request bubbles up to the controller; nothing is
//! retried silently except the repair loop's explicit, bounded retries.

use cogitor_context::ContextError;
use cogitor_patch::{PatchError, SandboxError};
use cogitor_runner::RunnerError;
use cogitor_runtime::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("request cancelled by user")]
    CancelledByUser,

    #[error("network deadline exceeded after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("could not parse the reply: {0}")]
    ParseFailed(String),

    #[error(transparent)]
    SandboxViolation(#[from] SandboxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no usable references in the query")]
    NoReferencesResolved,

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Build(#[from] RunnerError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
}

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => EngineError::CancelledByUser,
            ProviderError::Timeout { seconds } => EngineError::Timeout { seconds },
            ProviderError::HttpStatus { status, body } => EngineError::HttpStatus {
                status,
                body: excerpt(&body),
            },
            ProviderError::Transport(msg) => EngineError::Network(msg),
            ProviderError::Decode(msg) | ProviderError::Unsupported(msg) => {
                EngineError::ParseFailed(msg)
            }
            ProviderError::EmptyResponse => {
                EngineError::ParseFailed("empty response body".to_string())
            }
            ProviderError::MockQueueEmpty => {
                EngineError::Network("mock provider queue empty".to_string())
            }
        }
    }
}

/// Response bodies in errors are bounded so one bad reply cannot flood the
/// terminal.
fn excerpt(body: &str) -> String {
    const CAP: usize = 512;
    if body.len() <= CAP {
        return body.to_string();
    }
    let mut cut = CAP;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &body[..cut])
}

pub type EngineResult<T> = Result<T, EngineError>;
