//! Pollinations text API provider.

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    extract_content, with_scope, ChatProvider, ChatRequest, ProviderError, REMOTE_DEADLINE,
};

#[derive(Debug, Clone)]
pub struct PollinationsProvider {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct PollinationsMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct PollinationsRequest<'a> {
    model: &'a str,
    messages: Vec<PollinationsMessage<'a>>,
    seed: u32,
}

impl PollinationsProvider {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn post_chat(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        let payload = PollinationsRequest {
            model: &req.model,
            messages: vec![
                PollinationsMessage {
                    role: "system",
                    content: "You are a helpful assistant.",
                },
                PollinationsMessage {
                    role: "user",
                    content: &req.message,
                },
            ],
            seed: 42,
        };

        let mut builder = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &req.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
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
impl ChatProvider for PollinationsProvider {
    fn name(&self) -> &'static str {
        "pollinations"
    }

    async fn send(
        &self,
        scope: &CancellationToken,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        with_scope(scope, REMOTE_DEADLINE, self.post_chat(&req)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn network_tests_enabled() -> bool {
        matches!(std::env::var("COGITOR_RUN_NETWORK_TESTS"), Ok(value) if value == "1")
    }

    #[tokio::test]
    async fn send_includes_system_message_and_seed() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set COGITOR_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai")
                    .json_body_partial(r#"{"seed":42}"#);
                then.status(200).json_body(json!({"text": "bloom"}));
            })
            .await;

        let provider = PollinationsProvider::new(
            reqwest::Client::new(),
            format!("{}/openai", server.base_url()),
        );
        let scope = CancellationToken::new();
        let reply = provider
            .send(&scope, ChatRequest::new("hello", "openai"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply, "bloom");
    }
}
