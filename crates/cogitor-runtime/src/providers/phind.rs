//! Phind agent provider.
//!
//! Phind speaks Server-Sent Events: the reply arrives as `data: {...}`
//! frames whose deltas are concatenated. `[DONE]` or a `finish_reason` of
//! `"stop"` ends the stream; a stream that ends without either closes
//! cleanly and the accumulated content is accepted.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{with_scope, ChatProvider, ChatRequest, ProviderError, REMOTE_DEADLINE};

#[derive(Debug, Clone)]
pub struct PhindProvider {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct PhindMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct PhindRequest<'a> {
    additional_extension_context: &'a str,
    allow_magic_buttons: bool,
    is_vscode_extension: bool,
    requested_model: &'a str,
    user_input: &'a str,
    message_history: Vec<PhindMessage<'a>>,
}

/// What one SSE frame contributes to the accumulated reply.
#[derive(Debug, PartialEq, Eq)]
enum FrameAction {
    Append(String),
    Stop,
    Skip,
}

fn parse_frame(data: &str) -> FrameAction {
    if data == "[DONE]" {
        return FrameAction::Stop;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return FrameAction::Skip;
    };
    let Some(choice) = value.get("choices").and_then(Value::as_array).and_then(|c| c.first())
    else {
        return FrameAction::Skip;
    };

    if choice.pointer("/finish_reason").and_then(Value::as_str) == Some("stop") {
        return FrameAction::Stop;
    }
    if let Some(text) = choice.pointer("/delta/content").and_then(Value::as_str) {
        if !text.is_empty() {
            return FrameAction::Append(text.to_string());
        }
    }
    if let Some(text) = choice.pointer("/message/content").and_then(Value::as_str) {
        if !text.is_empty() {
            return FrameAction::Append(text.to_string());
        }
    }
    FrameAction::Skip
}

impl PhindProvider {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn stream_chat(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        let payload = PhindRequest {
            additional_extension_context: "",
            allow_magic_buttons: true,
            is_vscode_extension: true,
            requested_model: &req.model,
            user_input: &req.message,
            message_history: vec![
                PhindMessage {
                    role: "system",
                    content: "You are a helpful assistant.",
                },
                PhindMessage {
                    role: "user",
                    content: &req.message,
                },
            ],
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            // Phind rejects requests carrying a real User-Agent.
            .header("User-Agent", "")
            .header("Accept", "*/*")
            .header("Accept-Encoding", "identity")
            .json(&payload);
        if let Some(key) = &req.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let mut source =
            EventSource::new(builder).map_err(|e| ProviderError::Transport(e.to_string()))?;

        let mut content = String::new();
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => match parse_frame(&msg.data) {
                    FrameAction::Append(text) => content.push_str(&text),
                    FrameAction::Stop => break,
                    FrameAction::Skip => {}
                },
                Err(SseError::StreamEnded) => break,
                Err(err) => {
                    // A broken stream after content arrived is accepted as a
                    // complete reply; before any content it is a failure.
                    if content.is_empty() {
                        return Err(ProviderError::Transport(err.to_string()));
                    }
                    break;
                }
            }
        }
        source.close();

        if content.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl ChatProvider for PhindProvider {
    fn name(&self) -> &'static str {
        "phind"
    }

    async fn send(
        &self,
        scope: &CancellationToken,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        with_scope(scope, REMOTE_DEADLINE, self.stream_chat(&req)).await
    }
}
