//! Cogitor conversation context.
//!
//! This crate provides:
//! - `Reference` extraction from free-text queries (`@file`, `@all`, `@url`)
//! - bounded conversation history with deterministic FIFO eviction
//! - the RAG document store with per-document and total caps

pub mod error;
pub mod exchange;
pub mod history;
pub mod rag;
pub mod reference;

pub use error::{ContextError, ContextResult};
pub use exchange::Exchange;
pub use history::ConversationHistory;
pub use rag::{RagDocument, RagStore};
pub use reference::{extract_references, Reference};

/// Prelude for common imports
pub mod prelude {
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::exchange::Exchange;
    pub use crate::history::ConversationHistory;
    pub use crate::rag::{RagDocument, RagStore};
    pub use crate::reference::{extract_references, Reference};
}
