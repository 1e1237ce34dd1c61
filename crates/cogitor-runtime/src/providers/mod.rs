//! LLM provider implementations
//!
//! Concrete implementations of the `ChatProvider` trait for the supported
//! backends: OpenAI-compatible endpoints (ollama, openrouter, bare URLs),
//! pollinations, and the SSE-based phind agent.

pub mod openai_compat;
pub mod phind;
pub mod pollinations;

pub use openai_compat::OpenAiCompatProvider;
pub use phind::PhindProvider;
pub use pollinations::PollinationsProvider;
