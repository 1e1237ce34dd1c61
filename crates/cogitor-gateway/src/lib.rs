//! Web surface for the cogitor engine.
//!
//! HTTP endpoints live under `/api/…`; the WebSocket at `/api/ws` carries
//! typed JSON messages. Every inbound query dispatches into the same
//! singleton pipeline and is serialized by the request-scope slot.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use cogitor_engine::{AutoPilot, QueryOutcome, Session};

pub mod command;
pub mod ws;

pub use command::dispatch_command;
pub use ws::{ClientMessage, ServerMessage};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

/// Build the full API router over one session.
pub fn build_routes(session: Arc<Session>) -> Router {
    let state = AppState { session };

    Router::new()
        .route("/api/status", get(status))
        .route("/api/system", get(system_info))
        .route("/api/config", get(get_config).post(set_config))
        .route("/api/command", post(run_command))
        .route("/api/context-limit", post(set_context_limit))
        .route("/api/provider", post(set_provider))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/save", post(save_session))
        .route("/api/sessions/load", post(load_session))
        .route("/api/sessions/:name", delete(delete_session))
        .route("/api/rag/status", get(rag_status))
        .route("/api/rag/upload", post(rag_upload))
        .route("/api/rag/enable", post(rag_enable))
        .route("/api/rag/disable", post(rag_disable))
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let triple = state.session.provider_triple();
    Json(json!({
        "status": "ok",
        "provider": triple.kind.name(),
        "model": triple.model,
        "exchanges": state.session.history.len().await,
        "estimated_tokens": state.session.history.estimated_tokens().await,
    }))
}

async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "version": VERSION,
        "working_dir": state.session.working_root().display().to_string(),
        "os": std::env::consts::OS,
        "stats": state.session.stats.snapshot(),
    }))
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.config_snapshot())
}

#[derive(Debug, Deserialize)]
struct SetConfigRequest {
    key: String,
    value: String,
}

async fn set_config(
    State(state): State<AppState>,
    Json(payload): Json<SetConfigRequest>,
) -> Response {
    let result = state
        .session
        .update_config(|config| config.set(&payload.key, &payload.value));
    match result {
        Ok(()) => {
            if payload.key == "context_limit" {
                let limit = state.session.config_snapshot().context_limit;
                state.session.history.set_max_count(limit).await;
            }
            Json(state.session.config_snapshot()).into_response()
        }
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
}

async fn run_command(
    State(state): State<AppState>,
    Json(payload): Json<CommandRequest>,
) -> Response {
    match dispatch_command(&state.session, &payload.command).await {
        Ok(output) => Json(json!({ "output": output })).into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err),
    }
}

#[derive(Debug, Deserialize)]
struct ContextLimitRequest {
    limit: usize,
}

async fn set_context_limit(
    State(state): State<AppState>,
    Json(payload): Json<ContextLimitRequest>,
) -> Response {
    let result = state
        .session
        .update_config(|config| config.set("context_limit", &payload.limit.to_string()));
    match result {
        Ok(()) => {
            state.session.history.set_max_count(payload.limit).await;
            Json(json!({ "context_limit": payload.limit })).into_response()
        }
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ProviderRequest {
    provider: String,
    model: String,
    #[serde(default)]
    api_key: Option<String>,
}

async fn set_provider(
    State(state): State<AppState>,
    Json(payload): Json<ProviderRequest>,
) -> Response {
    let Some(kind) = cogitor_runtime::ProviderKind::parse(&payload.provider) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("unsupported provider: {}", payload.provider),
        );
    };
    state
        .session
        .set_provider(kind.clone(), payload.model.clone(), payload.api_key);
    Json(json!({ "provider": kind.name(), "model": payload.model })).into_response()
}

async fn list_sessions(State(state): State<AppState>) -> Response {
    match state.session.store.list() {
        Ok(sessions) => {
            let names: Vec<String> = sessions.into_iter().map(|s| s.name).collect();
            Json(json!({ "sessions": names })).into_response()
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct SessionNameRequest {
    name: String,
}

async fn save_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionNameRequest>,
) -> Response {
    let triple = state.session.provider_triple();
    let data = cogitor_engine::SessionData::new(
        triple.kind.name(),
        &triple.model,
        state.session.history.snapshot().await,
    );
    match state.session.store.save(&payload.name, &data) {
        Ok(path) => Json(json!({ "saved": path.display().to_string() })).into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn load_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionNameRequest>,
) -> Response {
    match state.session.store.load(&payload.name) {
        Ok(data) => {
            state.session.history.load(data.exchanges).await;
            Json(json!({
                "loaded": payload.name,
                "exchanges": state.session.history.len().await,
                "saved_with": format!("{}/{}", data.provider, data.model),
            }))
            .into_response()
        }
        Err(err) => error_response(StatusCode::NOT_FOUND, &err.to_string()),
    }
}

async fn delete_session(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.session.store.soft_delete(&name) {
        Ok(_) => Json(json!({ "deleted": name })).into_response(),
        Err(err) => error_response(StatusCode::NOT_FOUND, &err.to_string()),
    }
}

async fn rag_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "enabled": state.session.rag.is_enabled().await,
        "documents": state.session.rag.document_count().await,
    }))
}

#[derive(Debug, Deserialize)]
struct RagUploadRequest {
    path: String,
    content: String,
}

async fn rag_upload(
    State(state): State<AppState>,
    Json(payload): Json<RagUploadRequest>,
) -> Response {
    state
        .session
        .rag
        .add_document(cogitor_context::RagDocument::new(
            payload.path,
            payload.content,
        ))
        .await;
    Json(json!({
        "enabled": true,
        "documents": state.session.rag.document_count().await,
    }))
    .into_response()
}

async fn rag_enable(State(state): State<AppState>) -> impl IntoResponse {
    state.session.rag.set_enabled(true).await;
    Json(json!({ "enabled": true }))
}

async fn rag_disable(State(state): State<AppState>) -> impl IntoResponse {
    state.session.rag.set_enabled(false).await;
    Json(json!({ "enabled": false }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// WebSocket handler
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    use futures::{SinkExt, StreamExt};

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(encoded) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(encoded)).await.is_err() {
                break;
            }
        }
    });

    let triple = state.session.provider_triple();
    let _ = tx
        .send(ServerMessage::Welcome {
            version: VERSION.to_string(),
            provider: triple.kind.name().to_string(),
            model: triple.model,
        })
        .await;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                tracing::error!(error = %err, "websocket error");
                break;
            }
        };

        let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
        let reply = match parsed {
            Ok(message) => ws::handle_client_message(&state.session, message, &tx).await,
            Err(err) => Some(ServerMessage::Error {
                message: format!("bad message: {err}"),
            }),
        };
        if let Some(reply) = reply {
            if tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    writer.abort();
}

/// Dispatch one query for the WebSocket path.
pub(crate) async fn process_ws_query(session: &Arc<Session>, text: &str) -> ServerMessage {
    match session.process_query(text, true, &AutoPilot).await {
        Ok(QueryOutcome::Command { raw }) => match dispatch_command(session, &raw).await {
            Ok(output) => ServerMessage::CommandResult { output },
            Err(err) => ServerMessage::Error { message: err },
        },
        Ok(outcome) => ServerMessage::Response { outcome },
        Err(err) => ServerMessage::Error {
            message: err.to_string(),
        },
    }
}
