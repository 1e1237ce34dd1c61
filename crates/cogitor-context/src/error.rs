//! Error types for context management

use thiserror::Error;

/// Context management error type
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContextError {
    #[error("count must be a positive number")]
    NonPositiveCount,

    #[error("history holds only {0} exchanges")]
    NotEnoughExchanges(usize),
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;
