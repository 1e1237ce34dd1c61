//! Session persistence under `<home>/.cogitor/sessions/`.
//!
//! Sessions are plain JSON, written atomically (temp file + rename).
//! Deletion is soft: the file moves into a `.trash/` subfolder with a
//! `.meta` sidecar carrying what is needed to restore it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{EngineError, EngineResult};

pub const SESSION_FORMAT_VERSION: &str = "1.0";

const NAME_MAX_LEN: usize = 50;
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub version: String,
    pub timestamp: String,
    pub provider: String,
    pub model: String,
    pub exchanges: Vec<String>,
}

impl SessionData {
    pub fn new(provider: &str, model: &str, exchanges: Vec<String>) -> Self {
        Self {
            version: SESSION_FORMAT_VERSION.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            provider: provider.to_string(),
            model: model.to_string(),
            exchanges,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub name: String,
    pub modified: SystemTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrashMeta {
    original_name: String,
    deleted_at: String,
    original_path: String,
    content: String,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store under the operator's home directory.
    pub fn default_location() -> EngineResult<Self> {
        Config::config_dir()
            .map(|dir| Self::new(dir.join("sessions")))
            .ok_or_else(|| EngineError::ConfigInvalid("home directory unavailable".to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, name: &str, data: &SessionData) -> EngineResult<PathBuf> {
        validate_name(name)?;
        std::fs::create_dir_all(&self.dir)?;

        let path = self.session_path(name);
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| EngineError::ParseFailed(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).inspect_err(|_| {
            let _ = std::fs::remove_file(&tmp);
        })?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.session_path(name).exists()
    }

    pub fn load(&self, name: &str) -> EngineResult<SessionData> {
        let path = self.session_path(name);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::SessionNotFound(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&json).map_err(|e| EngineError::ParseFailed(e.to_string()))
    }

    /// Saved sessions, newest first.
    pub fn list(&self) -> EngineResult<Vec<SessionSummary>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            sessions.push(SessionSummary {
                name: name.to_string(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(sessions)
    }

    /// Move a session into `.trash/` with a `.meta` sidecar.
    pub fn soft_delete(&self, name: &str) -> EngineResult<PathBuf> {
        validate_name(name)?;
        let path = self.session_path(name);
        if !path.exists() {
            return Err(EngineError::SessionNotFound(name.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        let trash_dir = self.dir.join(".trash");
        std::fs::create_dir_all(&trash_dir)?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let trash_path = trash_dir.join(format!("{name}_{stamp}.json"));

        let meta = TrashMeta {
            original_name: name.to_string(),
            deleted_at: Utc::now().to_rfc3339(),
            original_path: path.display().to_string(),
            content,
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| EngineError::ParseFailed(e.to_string()))?;
        let mut meta_path = trash_path.clone().into_os_string();
        meta_path.push(".meta");
        std::fs::write(PathBuf::from(meta_path), meta_json)?;

        std::fs::rename(&path, &trash_path)?;
        Ok(trash_path)
    }

    fn session_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

fn validate_name(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::ConfigInvalid(
            "session name cannot be empty".to_string(),
        ));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(EngineError::ConfigInvalid(
            "session name is too long (max 50 characters)".to_string(),
        ));
    }
    if name.contains(FORBIDDEN_NAME_CHARS) || name.starts_with('.') {
        return Err(EngineError::ConfigInvalid(
            "session name contains forbidden characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        (dir, store)
    }

    #[test]
    fn save_load_round_trips_exchanges() {
        let (_dir, store) = store();
        let data = SessionData::new(
            "ollama",
            "gemma3:4b",
            vec!["Question: hi\nAnswer: hello".to_string()],
        );
        store.save("work", &data).unwrap();

        let loaded = store.load("work").unwrap();
        assert_eq!(loaded, data);
        assert_eq!(loaded.version, SESSION_FORMAT_VERSION);
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let (_dir, store) = store();
        let data = SessionData::new("ollama", "m", Vec::new());
        let path = store.save("clean", &data).unwrap();
        let siblings: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(siblings, vec!["clean.json"]);
    }

    #[test]
    fn load_of_missing_session_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("ghost"),
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[test]
    fn list_returns_newest_first() {
        let (_dir, store) = store();
        let data = SessionData::new("p", "m", Vec::new());
        store.save("older", &data).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        store.save("newer", &data).unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[test]
    fn forbidden_names_are_rejected() {
        let (_dir, store) = store();
        let data = SessionData::new("p", "m", Vec::new());
        assert!(store.save("a/b", &data).is_err());
        assert!(store.save("", &data).is_err());
        assert!(store.save(&"x".repeat(51), &data).is_err());
        assert!(store.save(".trash", &data).is_err());
    }

    #[test]
    fn soft_delete_moves_to_trash_with_meta_sidecar() {
        let (_dir, store) = store();
        let data = SessionData::new("p", "m", vec!["ex".to_string()]);
        store.save("doomed", &data).unwrap();

        let trash_path = store.soft_delete("doomed").unwrap();
        assert!(!store.exists("doomed"));
        assert!(trash_path.exists());

        let mut meta_path = trash_path.clone().into_os_string();
        meta_path.push(".meta");
        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(PathBuf::from(meta_path)).unwrap())
                .unwrap();
        assert_eq!(meta["original_name"], "doomed");
        assert!(meta["content"].as_str().unwrap().contains("\"ex\""));
    }

    #[test]
    fn trash_entries_do_not_show_in_list() {
        let (_dir, store) = store();
        let data = SessionData::new("p", "m", Vec::new());
        store.save("kept", &data).unwrap();
        store.save("gone", &data).unwrap();
        store.soft_delete("gone").unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["kept"]);
    }
}
