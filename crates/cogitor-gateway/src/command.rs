//! The `:command` set exposed over the web surface.
//!
//! Commands operating on terminal-only collaborators (clipboard, shell,
//! editor) stay with the CLI; this dispatcher covers the session-state
//! commands a remote client can meaningfully use.

use std::sync::Arc;

use cogitor_engine::{Session, SessionData};

/// Execute one `:command` against the session. Returns the display text
/// or an error message.
pub async fn dispatch_command(session: &Arc<Session>, raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix(':').unwrap_or(trimmed);
    let mut parts = body.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match name {
        "help" => Ok(help_text()),
        "ctx" => Ok(format!(
            "exchanges: {}, estimated tokens: {}",
            session.history.len().await,
            session.history.estimated_tokens().await,
        )),
        "clean" => {
            session.history.clear().await;
            Ok("context cleared".to_string())
        }
        "pop" => {
            let count: usize = args
                .first()
                .unwrap_or(&"1")
                .parse()
                .map_err(|_| "usage: :pop [n]".to_string())?;
            session
                .history
                .pop(count)
                .await
                .map_err(|e| e.to_string())?;
            Ok(format!("removed {count} exchanges"))
        }
        "limit" => {
            let limit: usize = args
                .first()
                .ok_or_else(|| "usage: :limit <n>".to_string())?
                .parse()
                .map_err(|_| "usage: :limit <n>".to_string())?;
            session
                .update_config(|config| config.set("context_limit", &limit.to_string()))
                .map_err(|e| e.to_string())?;
            session.history.set_max_count(limit).await;
            Ok(format!("context limit set to {limit}"))
        }
        "stats" => {
            let snapshot = session.stats.snapshot();
            Ok(format!(
                "requests: {}, avg: {}ms, last hour: {}",
                snapshot.request_count,
                snapshot.avg_request_time_ms,
                snapshot.recent_hour_requests,
            ))
        }
        "set" => {
            let (key, value) = match (args.first(), args.get(1)) {
                (Some(key), Some(value)) => (*key, *value),
                _ => return Err("usage: :set <key> <value>".to_string()),
            };
            session
                .update_config(|config| config.set(key, value))
                .map_err(|e| e.to_string())?;
            Ok(format!("{key} = {value}"))
        }
        "get" => {
            let key = args.first().ok_or_else(|| "usage: :get <key>".to_string())?;
            session
                .config_snapshot()
                .get(key)
                .map(|value| format!("{key} = {value}"))
                .ok_or_else(|| format!("unknown setting: {key}"))
        }
        "save" => {
            let name = args.first().unwrap_or(&"session");
            let triple = session.provider_triple();
            let data = SessionData::new(
                triple.kind.name(),
                &triple.model,
                session.history.snapshot().await,
            );
            let path = session
                .store
                .save(name, &data)
                .map_err(|e| e.to_string())?;
            Ok(format!("session saved: {}", path.display()))
        }
        "load" => {
            let name = args.first().ok_or_else(|| "usage: :load <name>".to_string())?;
            let data = session.store.load(name).map_err(|e| e.to_string())?;
            session.history.load(data.exchanges).await;
            Ok(format!(
                "session loaded: {name} ({} exchanges)",
                session.history.len().await
            ))
        }
        "ls" => {
            let sessions = session.store.list().map_err(|e| e.to_string())?;
            if sessions.is_empty() {
                Ok("no saved sessions".to_string())
            } else {
                Ok(sessions
                    .into_iter()
                    .map(|s| s.name)
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
        "rm" => {
            let name = args.first().ok_or_else(|| "usage: :rm <name>".to_string())?;
            session.store.soft_delete(name).map_err(|e| e.to_string())?;
            Ok(format!("session '{name}' deleted"))
        }
        "models" => {
            let kind = match args.first() {
                Some(name) => cogitor_runtime::ProviderKind::parse(name)
                    .ok_or_else(|| format!("unsupported provider: {name}"))?,
                None => session.provider_triple().kind,
            };
            let client = reqwest::Client::new();
            let entries = cogitor_runtime::list_models(&client, &kind)
                .await
                .map_err(|e| e.to_string())?;
            Ok(entries
                .into_iter()
                .map(|m| {
                    if m.description.is_empty() {
                        m.id
                    } else {
                        format!("{:<40} {}", m.id, m.description)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "model" => {
            let model = args.first().ok_or_else(|| "usage: :model <name>".to_string())?;
            session.set_model(*model);
            Ok(format!("model set to {model}"))
        }
        "provider" => {
            let name = args
                .first()
                .ok_or_else(|| "usage: :provider <name> [model] [api_key]".to_string())?;
            let kind = cogitor_runtime::ProviderKind::parse(name)
                .ok_or_else(|| format!("unsupported provider: {name}"))?;
            let model = args
                .get(1)
                .map(|m| m.to_string())
                .unwrap_or_else(|| session.provider_triple().model);
            let api_key = args.get(2).map(|k| k.to_string());
            session.set_provider(kind.clone(), model.clone(), api_key);
            Ok(format!("provider set to {}/{model}", kind.name()))
        }
        other => Err(format!("unknown command: :{other}")),
    }
}

fn help_text() -> String {
    [
        ":ctx              show context size",
        ":clean            clear the conversation context",
        ":pop [n]          drop the last n exchanges",
        ":limit <n>        set the context exchange limit",
        ":stats            request statistics",
        ":set <key> <val>  change a config value",
        ":get <key>        read a config value",
        ":save [name]      save the session",
        ":load <name>      load a session",
        ":ls               list saved sessions",
        ":rm <name>        delete a session (kept in trash)",
        ":models [provider] list the provider's model catalog",
        ":model <name>     switch the model",
        ":provider <p> [model] [key]  switch the provider",
    ]
    .join("\n")
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

    #[tokio::test]
    async fn ctx_clean_and_pop_manage_history() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.history.add("q1", "a1").await;
        session.history.add("q2", "a2").await;

        let out = dispatch_command(&session, ":ctx").await.unwrap();
        assert!(out.contains("exchanges: 2"));

        dispatch_command(&session, ":pop 1").await.unwrap();
        assert_eq!(session.history.len().await, 1);

        dispatch_command(&session, ":clean").await.unwrap();
        assert_eq!(session.history.len().await, 0);
    }

    #[tokio::test]
    async fn pop_rejects_garbage_and_overflow() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        assert!(dispatch_command(&session, ":pop nope").await.is_err());
        assert!(dispatch_command(&session, ":pop 5").await.is_err());
    }

    #[tokio::test]
    async fn set_and_get_round_trip_config() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);

        dispatch_command(&session, ":set debug_mode on").await.unwrap();
        let out = dispatch_command(&session, ":get debug_mode").await.unwrap();
        assert_eq!(out, "debug_mode = true");

        assert!(dispatch_command(&session, ":set bogus 1").await.is_err());
    }

    #[tokio::test]
    async fn save_load_rm_cycle_works() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.history.add("q", "a").await;

        dispatch_command(&session, ":save demo").await.unwrap();
        session.history.clear().await;

        let out = dispatch_command(&session, ":load demo").await.unwrap();
        assert!(out.contains("1 exchanges"));

        dispatch_command(&session, ":rm demo").await.unwrap();
        assert!(dispatch_command(&session, ":load demo").await.is_err());
    }

    #[tokio::test]
    async fn provider_command_swaps_the_triple() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);

        dispatch_command(&session, ":provider phind Phind-70B")
            .await
            .unwrap();
        let triple = session.provider_triple();
        assert_eq!(triple.kind.name(), "phind");
        assert_eq!(triple.model, "Phind-70B");

        assert!(dispatch_command(&session, ":provider fax-machine").await.is_err());
    }

    #[tokio::test]
    async fn unknown_commands_are_rejected() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        let err = dispatch_command(&session, ":frobnicate").await.unwrap_err();
        assert!(err.contains("unknown command"));
    }
}
