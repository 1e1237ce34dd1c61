//! Persisted configuration at `<home>/.cogitor/config.json`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Runtime-tunable settings. Unknown keys in the file are rejected on load
/// so typos surface instead of silently reverting to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_retries: u32,
    pub web_search: bool,
    pub debug_mode: bool,
    pub context_limit: usize,
    pub auto_execute: bool,
    pub skip_install: bool,
    pub auto_copy_responses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 10,
            web_search: true,
            debug_mode: false,
            context_limit: 10,
            auto_execute: false,
            skip_install: false,
            auto_copy_responses: false,
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".cogitor"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Load from disk; a missing file means defaults.
    pub fn load() -> EngineResult<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| EngineError::ConfigInvalid(e.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self) -> EngineResult<()> {
        let Some(dir) = Self::config_dir() else {
            return Err(EngineError::ConfigInvalid(
                "home directory unavailable".to_string(),
            ));
        };
        std::fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigInvalid(e.to_string()))?;
        std::fs::write(dir.join("config.json"), data)?;
        Ok(())
    }

    /// Set one key from its string form, with validation.
    pub fn set(&mut self, key: &str, value: &str) -> EngineResult<()> {
        match key {
            "max_retries" => {
                let parsed: u32 = parse_positive(key, value)?;
                self.max_retries = parsed;
            }
            "context_limit" => {
                let parsed: u32 = parse_positive(key, value)?;
                if parsed > 100 {
                    return Err(EngineError::ConfigInvalid(
                        "context_limit is too large (max 100)".to_string(),
                    ));
                }
                self.context_limit = parsed as usize;
            }
            "web_search" => self.web_search = parse_bool(value),
            "debug_mode" => self.debug_mode = parse_bool(value),
            "auto_execute" => self.auto_execute = parse_bool(value),
            "skip_install" => self.skip_install = parse_bool(value),
            "auto_copy_responses" => self.auto_copy_responses = parse_bool(value),
            other => {
                return Err(EngineError::ConfigInvalid(format!(
                    "unknown setting: {other}"
                )))
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "max_retries" => Some(self.max_retries.to_string()),
            "web_search" => Some(self.web_search.to_string()),
            "debug_mode" => Some(self.debug_mode.to_string()),
            "context_limit" => Some(self.context_limit.to_string()),
            "auto_execute" => Some(self.auto_execute.to_string()),
            "skip_install" => Some(self.skip_install.to_string()),
            "auto_copy_responses" => Some(self.auto_copy_responses.to_string()),
            _ => None,
        }
    }
}

fn parse_positive(key: &str, value: &str) -> EngineResult<u32> {
    let parsed: u32 = value
        .parse()
        .map_err(|_| EngineError::ConfigInvalid(format!("invalid value '{value}' for {key}")))?;
    if parsed == 0 {
        return Err(EngineError::ConfigInvalid(format!(
            "{key} must be a positive number"
        )));
    }
    Ok(parsed)
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "true" | "on" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_retries, 10);
        assert!(config.web_search);
        assert!(!config.debug_mode);
        assert_eq!(config.context_limit, 10);
        assert!(!config.auto_execute);
        assert!(!config.skip_install);
        assert!(!config.auto_copy_responses);
    }

    #[test]
    fn set_parses_ints_and_bools() {
        let mut config = Config::default();
        config.set("max_retries", "3").unwrap();
        assert_eq!(config.max_retries, 3);
        config.set("web_search", "off").unwrap();
        assert!(!config.web_search);
        config.set("debug_mode", "on").unwrap();
        assert!(config.debug_mode);
        config.set("auto_copy_responses", "yes").unwrap();
        assert!(config.auto_copy_responses);
    }

    #[test]
    fn set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("max_retries", "zero").is_err());
        assert!(config.set("max_retries", "0").is_err());
        assert!(config.set("context_limit", "101").is_err());
        assert!(config.set("no_such_key", "1").is_err());
    }

    #[test]
    fn json_round_trip_preserves_every_field() {
        let mut config = Config::default();
        config.set("context_limit", "42").unwrap();
        config.set("skip_install", "true").unwrap();
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: Config = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let err = serde_json::from_str::<Config>(r#"{"max_retrys": 5}"#);
        assert!(err.is_err());
    }
}
