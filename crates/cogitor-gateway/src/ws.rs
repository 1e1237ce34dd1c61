//! WebSocket message types and dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use cogitor_context::RagDocument;
use cogitor_engine::{QueryOutcome, Session};

/// Messages the client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Query { text: String },
    Command { command: String },
    ContextUpdate { limit: usize },
    FileUpload { path: String, content: String },
    RagStatus,
    FsCd { path: String },
    FsLs { path: Option<String> },
    FsOpen { path: String },
}

/// Messages the server sends back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        version: String,
        provider: String,
        model: String,
    },
    Thinking,
    Response {
        outcome: QueryOutcome,
    },
    CommandResult {
        output: String,
    },
    Context {
        exchanges: usize,
        estimated_tokens: usize,
    },
    ContextUpdated {
        limit: usize,
    },
    RagStatus {
        enabled: bool,
        documents: usize,
    },
    ProviderUpdated {
        provider: String,
        model: String,
    },
    Error {
        message: String,
    },
    FsListing {
        path: String,
        entries: Vec<serde_json::Value>,
    },
    FsFile {
        path: String,
        content: String,
    },
}

/// Handle one parsed client message, returning the reply to send. Queries
/// emit a `Thinking` notification before the pipeline runs.
pub async fn handle_client_message(
    session: &Arc<Session>,
    message: ClientMessage,
    tx: &mpsc::Sender<ServerMessage>,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::Query { text } => {
            let _ = tx.send(ServerMessage::Thinking).await;
            Some(crate::process_ws_query(session, &text).await)
        }
        ClientMessage::Command { command } => {
            match crate::dispatch_command(session, &command).await {
                Ok(output) => Some(ServerMessage::CommandResult { output }),
                Err(message) => Some(ServerMessage::Error { message }),
            }
        }
        ClientMessage::ContextUpdate { limit } => {
            let result = session
                .update_config(|config| config.set("context_limit", &limit.to_string()));
            match result {
                Ok(()) => {
                    session.history.set_max_count(limit).await;
                    Some(ServerMessage::ContextUpdated { limit })
                }
                Err(err) => Some(ServerMessage::Error {
                    message: err.to_string(),
                }),
            }
        }
        ClientMessage::FileUpload { path, content } => {
            session.rag.add_document(RagDocument::new(path, content)).await;
            Some(ServerMessage::RagStatus {
                enabled: true,
                documents: session.rag.document_count().await,
            })
        }
        ClientMessage::RagStatus => Some(ServerMessage::RagStatus {
            enabled: session.rag.is_enabled().await,
            documents: session.rag.document_count().await,
        }),
        ClientMessage::FsCd { path } | ClientMessage::FsLs { path: Some(path) } => {
            Some(list_directory(session, &path))
        }
        ClientMessage::FsLs { path: None } => Some(list_directory(session, ".")),
        ClientMessage::FsOpen { path } => Some(open_file(session, &path)),
    }
}

fn list_directory(session: &Session, path: &str) -> ServerMessage {
    let resolved = match session.sandbox.resolve(path) {
        Ok(resolved) => resolved,
        Err(err) => {
            return ServerMessage::Error {
                message: err.to_string(),
            }
        }
    };
    let entries = match std::fs::read_dir(&resolved) {
        Ok(entries) => entries,
        Err(err) => {
            return ServerMessage::Error {
                message: err.to_string(),
            }
        }
    };

    let mut listing: Vec<serde_json::Value> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        listing.push(json!({ "name": name, "dir": is_dir }));
    }
    listing.sort_by_key(|v| v["name"].as_str().unwrap_or_default().to_string());

    ServerMessage::FsListing {
        path: path.to_string(),
        entries: listing,
    }
}

fn open_file(session: &Session, path: &str) -> ServerMessage {
    let resolved = match session.sandbox.resolve(path) {
        Ok(resolved) => resolved,
        Err(err) => {
            return ServerMessage::Error {
                message: err.to_string(),
            }
        }
    };
    match std::fs::read_to_string(&resolved) {
        Ok(content) => ServerMessage::FsFile {
            path: path.to_string(),
            content,
        },
        Err(err) => ServerMessage::Error {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogitor_engine::{Config, SessionStore};
    use cogitor_patch::PathSandbox;
    use cogitor_runtime::ProviderKind;
    use tempfile::TempDir;

    fn test_session(dir: &TempDir) -> Arc<Session> {
        Session::with_paths(
            ProviderKind::Ollama,
            "m",
            None,
            Config::default(),
            PathSandbox::new(dir.path()).unwrap(),
            SessionStore::new(dir.path().join(".sessions")),
        )
        .unwrap()
    }

    #[test]
    fn client_messages_parse_by_type_tag() {
        let query: ClientMessage =
            serde_json::from_str(r#"{"type":"query","text":"hi"}"#).unwrap();
        assert!(matches!(query, ClientMessage::Query { .. }));

        let upload: ClientMessage =
            serde_json::from_str(r#"{"type":"file_upload","path":"a.txt","content":"x"}"#)
                .unwrap();
        assert!(matches!(upload, ClientMessage::FileUpload { .. }));

        let bad = serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn server_messages_carry_their_type_tag() {
        let encoded = serde_json::to_value(ServerMessage::Thinking).unwrap();
        assert_eq!(encoded["type"], "thinking");

        let encoded = serde_json::to_value(ServerMessage::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(encoded["type"], "error");
        assert_eq!(encoded["message"], "boom");
    }

    #[tokio::test]
    async fn rag_upload_and_status_round_trip() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        let (tx, _rx) = mpsc::channel(8);

        let reply = handle_client_message(
            &session,
            ClientMessage::FileUpload {
                path: "facts.txt".to_string(),
                content: "alpha".to_string(),
            },
            &tx,
        )
        .await;
        assert!(matches!(
            reply,
            Some(ServerMessage::RagStatus {
                enabled: true,
                documents: 1
            })
        ));
    }

    #[tokio::test]
    async fn fs_listing_is_sandboxed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let session = test_session(&dir);
        let (tx, _rx) = mpsc::channel(8);

        let reply = handle_client_message(
            &session,
            ClientMessage::FsLs { path: None },
            &tx,
        )
        .await;
        match reply {
            Some(ServerMessage::FsListing { entries, .. }) => {
                assert!(entries.iter().any(|e| e["name"] == "a.txt"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let reply = handle_client_message(
            &session,
            ClientMessage::FsOpen {
                path: "../etc/passwd".to_string(),
            },
            &tx,
        )
        .await;
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn context_update_adjusts_the_history_cap() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        let (tx, _rx) = mpsc::channel(8);

        let reply = handle_client_message(
            &session,
            ClientMessage::ContextUpdate { limit: 2 },
            &tx,
        )
        .await;
        assert!(matches!(
            reply,
            Some(ServerMessage::ContextUpdated { limit: 2 })
        ));
        assert_eq!(session.history.max_count().await, 2);
    }
}
