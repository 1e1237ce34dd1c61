//! Pre-loaded RAG documents appended to the prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Per-document byte cap inside the rendered RAG context.
pub const RAG_DOC_CAP: usize = 5_000;

/// Total byte cap for the rendered RAG context.
pub const RAG_TOTAL_CAP: usize = 15_000;

/// One user-supplied data document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagDocument {
    pub path: String,
    pub content: String,
    pub size: usize,
    pub loaded_at: DateTime<Utc>,
}

impl RagDocument {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len(),
            content,
            loaded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct RagState {
    documents: Vec<RagDocument>,
    enabled: bool,
}

/// Readers/writer-locked store of RAG documents. Loading documents enables
/// the store; clearing disables it.
#[derive(Debug, Default)]
pub struct RagStore {
    inner: RwLock<RagState>,
}

impl RagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_documents(&self, documents: Vec<RagDocument>) {
        let mut state = self.inner.write().await;
        state.enabled = !documents.is_empty();
        state.documents = documents;
    }

    pub async fn add_document(&self, document: RagDocument) {
        let mut state = self.inner.write().await;
        state.documents.push(document);
        state.enabled = true;
    }

    pub async fn clear(&self) {
        let mut state = self.inner.write().await;
        state.documents.clear();
        state.enabled = false;
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.inner.write().await.enabled = enabled;
    }

    pub async fn is_enabled(&self) -> bool {
        self.inner.read().await.enabled
    }

    pub async fn document_count(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    pub async fn documents(&self) -> Vec<RagDocument> {
        self.inner.read().await.documents.clone()
    }

    /// Render the RAG section of the prompt, or an empty string when the
    /// store is disabled or empty. Documents are capped at `RAG_DOC_CAP`
    /// bytes each and `RAG_TOTAL_CAP` in total, with explicit markers.
    pub async fn render_context(&self) -> String {
        let state = self.inner.read().await;
        if !state.enabled || state.documents.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        out.push_str("\n=== DATA FILE CONTEXT (RAG) ===\n");
        out.push_str("Use ONLY this information to answer:\n\n");

        let mut total = 0usize;
        for (i, doc) in state.documents.iter().enumerate() {
            let mut content = doc.content.as_str();
            let mut truncated = false;
            if content.len() > RAG_DOC_CAP {
                let mut cut = RAG_DOC_CAP;
                while cut > 0 && !content.is_char_boundary(cut) {
                    cut -= 1;
                }
                content = &content[..cut];
                truncated = true;
            }

            let name = doc.path.rsplit('/').next().unwrap_or(&doc.path);
            out.push_str(&format!(
                "--- Document {}: {} ({} bytes) ---\n",
                i + 1,
                name,
                doc.size
            ));
            out.push_str(content);
            if truncated {
                out.push_str("... [truncated]");
            }
            out.push_str("\n\n");

            total += content.len();
            if total > RAG_TOTAL_CAP {
                out.push_str("...[remaining documents omitted from context]...\n");
                break;
            }
        }

        out.push_str("INSTRUCTIONS:\n");
        out.push_str("1. Use ONLY the provided file data\n");
        out.push_str("2. Do not add facts from your own knowledge\n");
        out.push_str("3. If the data is insufficient, say so honestly\n");
        out.push_str("4. Relate the user's request to the file data\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_renders_nothing() {
        let store = RagStore::new();
        assert!(!store.is_enabled().await);
        assert_eq!(store.render_context().await, "");
    }

    #[tokio::test]
    async fn loading_documents_enables_the_store() {
        let store = RagStore::new();
        store
            .set_documents(vec![RagDocument::new("notes.txt", "alpha beta")])
            .await;
        assert!(store.is_enabled().await);
        assert_eq!(store.document_count().await, 1);

        let rendered = store.render_context().await;
        assert!(rendered.contains("Document 1: notes.txt"));
        assert!(rendered.contains("alpha beta"));
        assert!(rendered.contains("Use ONLY the provided file data"));
    }

    #[tokio::test]
    async fn clearing_disables_the_store() {
        let store = RagStore::new();
        store
            .set_documents(vec![RagDocument::new("notes.txt", "alpha")])
            .await;
        store.clear().await;
        assert!(!store.is_enabled().await);
        assert_eq!(store.render_context().await, "");
    }

    #[tokio::test]
    async fn oversized_document_is_cut_with_marker() {
        let store = RagStore::new();
        store
            .set_documents(vec![RagDocument::new("big.txt", "x".repeat(RAG_DOC_CAP * 2))])
            .await;
        let rendered = store.render_context().await;
        assert!(rendered.contains("... [truncated]"));
        assert!(rendered.len() < RAG_DOC_CAP * 2);
    }

    #[tokio::test]
    async fn total_cap_stops_document_emission() {
        let store = RagStore::new();
        let docs = (0..6)
            .map(|i| RagDocument::new(format!("d{i}.txt"), "y".repeat(RAG_DOC_CAP)))
            .collect();
        store.set_documents(docs).await;
        let rendered = store.render_context().await;
        assert!(rendered.contains("...[remaining documents omitted from context]..."));
        assert!(!rendered.contains("Document 6"));
    }

    #[tokio::test]
    async fn document_basename_is_displayed() {
        let store = RagStore::new();
        store
            .set_documents(vec![RagDocument::new("deep/nested/data.csv", "1,2")])
            .await;
        let rendered = store.render_context().await;
        assert!(rendered.contains("Document 1: data.csv"));
    }
}
