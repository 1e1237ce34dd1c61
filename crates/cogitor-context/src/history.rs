//! Bounded conversation history with deterministic eviction.

use std::collections::VecDeque;

use tokio::sync::RwLock;

use crate::error::{ContextError, ContextResult};
use crate::exchange::Exchange;

/// Default number of retained exchanges.
pub const DEFAULT_MAX_EXCHANGES: usize = 10;

/// Hard upper bound for the exchange count cap.
pub const MAX_EXCHANGE_CAP: usize = 100;

/// Total byte cap across all retained exchanges.
pub const MAX_TOTAL_BYTES: usize = 500_000;

#[derive(Debug)]
struct HistoryState {
    exchanges: VecDeque<Exchange>,
    max_count: usize,
    total_bytes: usize,
}

impl HistoryState {
    /// Evict from the head while either cap is exceeded. Holds the
    /// invariant `len <= max_count && total_bytes <= MAX_TOTAL_BYTES`.
    fn enforce_caps(&mut self) {
        while self.exchanges.len() > self.max_count {
            if let Some(removed) = self.exchanges.pop_front() {
                self.total_bytes -= removed.size();
            }
        }
        while self.total_bytes > MAX_TOTAL_BYTES && self.exchanges.len() > 1 {
            if let Some(removed) = self.exchanges.pop_front() {
                self.total_bytes -= removed.size();
            }
        }
    }
}

/// Ordered sequence of exchanges behind a readers/writer lock. Readers may
/// observe the history mid-sequence but never torn strings.
#[derive(Debug)]
pub struct ConversationHistory {
    inner: RwLock<HistoryState>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::with_max_count(DEFAULT_MAX_EXCHANGES)
    }

    pub fn with_max_count(max_count: usize) -> Self {
        Self {
            inner: RwLock::new(HistoryState {
                exchanges: VecDeque::new(),
                max_count: max_count.clamp(1, MAX_EXCHANGE_CAP),
                total_bytes: 0,
            }),
        }
    }

    /// Append one exchange, then evict from the head while either cap is
    /// exceeded.
    pub async fn add(&self, question: &str, answer: &str) {
        let exchange = Exchange::new(question, answer);
        let mut state = self.inner.write().await;
        state.total_bytes += exchange.size();
        state.exchanges.push_back(exchange);
        state.enforce_caps();
    }

    /// Remove the last `n` exchanges.
    pub async fn pop(&self, n: usize) -> ContextResult<()> {
        if n == 0 {
            return Err(ContextError::NonPositiveCount);
        }
        let mut state = self.inner.write().await;
        if n > state.exchanges.len() {
            return Err(ContextError::NotEnoughExchanges(state.exchanges.len()));
        }
        for _ in 0..n {
            if let Some(removed) = state.exchanges.pop_back() {
                state.total_bytes -= removed.size();
            }
        }
        Ok(())
    }

    pub async fn clear(&self) {
        let mut state = self.inner.write().await;
        state.exchanges.clear();
        state.total_bytes = 0;
    }

    /// Change the count cap, clamped to `[1, 100]`, evicting from the head.
    pub async fn set_max_count(&self, max_count: usize) {
        let mut state = self.inner.write().await;
        state.max_count = max_count.clamp(1, MAX_EXCHANGE_CAP);
        state.enforce_caps();
    }

    pub async fn max_count(&self) -> usize {
        self.inner.read().await.max_count
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.exchanges.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.exchanges.is_empty()
    }

    pub async fn total_bytes(&self) -> usize {
        self.inner.read().await.total_bytes
    }

    /// Rough token estimate: one token per three bytes.
    pub async fn estimated_tokens(&self) -> usize {
        self.inner.read().await.total_bytes / 3
    }

    /// Render the history for prompt assembly. Empty history yields an
    /// empty string, not a bare header.
    pub async fn render(&self) -> String {
        let state = self.inner.read().await;
        if state.exchanges.is_empty() {
            return String::new();
        }
        let joined = state
            .exchanges
            .iter()
            .map(Exchange::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("Previous exchanges:\n{joined}\n\n")
    }

    /// All rendered exchanges, oldest first (session save path).
    pub async fn snapshot(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .exchanges
            .iter()
            .map(|e| e.as_str().to_string())
            .collect()
    }

    /// Replace the history from rendered exchanges (session load path).
    /// Caps are re-applied.
    pub async fn load(&self, exchanges: Vec<String>) {
        let mut state = self.inner.write().await;
        state.exchanges.clear();
        state.total_bytes = 0;
        for rendered in exchanges {
            let exchange = Exchange::from_rendered(rendered);
            state.total_bytes += exchange.size();
            state.exchanges.push_back(exchange);
        }
        state.enforce_caps();
    }
}
