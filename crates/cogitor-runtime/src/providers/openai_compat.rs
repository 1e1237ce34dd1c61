//! OpenAI-compatible chat completion provider.
//!
//! Serves three provider kinds: the local ollama endpoint, openrouter, and
//! any bare URL the operator supplies.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    authorization_value, extract_content, with_scope, ChatProvider, ChatRequest, ProviderError,
};

#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    endpoint: String,
    deadline: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
}

impl OpenAiCompatProvider {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, deadline: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            deadline,
        }
    }

    async fn post_chat(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        let payload = ChatCompletionRequest {
            model: &req.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &req.message,
            }],
            temperature: 0.2,
            top_p: 1.0,
        };

        let mut builder = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &req.api_key {
            builder = builder.header("Authorization", authorization_value(key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        extract_content(&body)
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn send(
        &self,
        scope: &CancellationToken,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        with_scope(scope, self.deadline, self.post_chat(&req)).await
    }
}
