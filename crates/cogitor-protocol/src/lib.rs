//! Cogitor envelope grammar.
//!
//! This crate implements the wire contract shared with the LLM:
//! - `--- File: <path> ---` whole-file blocks
//! - `--- Diff: <path> ---` fuzzy-anchored patch blocks
//! - `--- Compile: <lang> ---` / `--- Install: <lang> ---` build metadata
//!
//! Classification is a single pass over the reply: whole-file blocks win,
//! then diff blocks, then the reply is plain prose.

use serde::{Deserialize, Serialize};

mod parse;

pub use parse::{classify, parse_code_blocks, parse_diff_blocks};

/// How a compile directive should be applied to the default toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildDirective {
    /// Flags appended to the language's default compile command.
    Flags(String),
    /// A full command that replaces the default verbatim.
    Command(String),
}

/// Build metadata attached to a file or diff block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileInfo {
    pub language: String,
    pub directive: Option<BuildDirective>,
    pub install_command: Option<String>,
}

impl CompileInfo {
    pub fn is_empty(&self) -> bool {
        self.language.is_empty() && self.directive.is_none() && self.install_command.is_none()
    }

    /// The full replacement command, if the directive carries one.
    pub fn command(&self) -> Option<&str> {
        match &self.directive {
            Some(BuildDirective::Command(cmd)) => Some(cmd),
            _ => None,
        }
    }

    /// Extra flags for the default command, if the directive carries them.
    pub fn flags(&self) -> Option<&str> {
        match &self.directive {
            Some(BuildDirective::Flags(flags)) => Some(flags),
            _ => None,
        }
    }
}

/// A whole file extracted from an LLM reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFile {
    pub path: String,
    pub content: String,
    pub compile: Option<CompileInfo>,
}

/// A fuzzy-located replacement: original lines, modified lines, and the
/// LLM's 1-based line hint. The hint is a suggestion, never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBlock {
    pub file_path: String,
    pub original: Vec<String>,
    pub modified: Vec<String>,
    /// 1-based start hint; 0 when the reply carried none.
    pub hint_start: usize,
    /// 1-based end hint; 0 when the reply carried none.
    pub hint_end: usize,
    pub compile: Option<CompileInfo>,
}

/// The classified shape of one LLM reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmReply {
    WholeFiles { files: Vec<CodeFile> },
    DiffBlocks { blocks: Vec<DiffBlock> },
    Prose { text: String },
}

impl LlmReply {
    pub fn is_prose(&self) -> bool {
        matches!(self, LlmReply::Prose { .. })
    }
}

/// Fast check: does the reply contain any envelope marker at all?
pub fn has_code_markers(response: &str) -> bool {
    response.contains("--- File:") || response.contains("--- Diff:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_info_accessors_follow_directive() {
        let with_command = CompileInfo {
            language: "c".to_string(),
            directive: Some(BuildDirective::Command("gcc -o app main.c -lssl".to_string())),
            install_command: None,
        };
        assert_eq!(with_command.command(), Some("gcc -o app main.c -lssl"));
        assert_eq!(with_command.flags(), None);

        let with_flags = CompileInfo {
            language: "c".to_string(),
            directive: Some(BuildDirective::Flags("-lm".to_string())),
            install_command: None,
        };
        assert_eq!(with_flags.command(), None);
        assert_eq!(with_flags.flags(), Some("-lm"));
    }

    #[test]
    fn marker_probe_sees_both_kinds() {
        assert!(has_code_markers("--- File: a.c ---\nint main(){}"));
        assert!(has_code_markers("--- Diff: a.c ---\nModified:\n"));
        assert!(!has_code_markers("plain prose with ``` fences"));
    }

    #[test]
    fn reply_serializes_with_kind_tag() {
        let reply = LlmReply::Prose {
            text: "hello".to_string(),
        };
        let encoded = serde_json::to_value(&reply).unwrap();
        assert_eq!(encoded["kind"], "prose");
        assert_eq!(encoded["text"], "hello");
    }
}
