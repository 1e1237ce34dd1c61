//! Language dispatch by file suffix.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// The closed set of languages the runner knows how to build or execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Python,
    C,
    Cpp,
    Fortran,
    Ruby,
    Kotlin,
    Swift,
    Assembly,
    Lisp,
    Html,
    Text,
}

impl Language {
    /// Infer the language from a file suffix.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "go" => Some(Language::Go),
            "py" => Some(Language::Python),
            "c" => Some(Language::C),
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            "f90" | "f95" | "f" => Some(Language::Fortran),
            "rb" => Some(Language::Ruby),
            "kt" => Some(Language::Kotlin),
            "swift" => Some(Language::Swift),
            "asm" => Some(Language::Assembly),
            "lisp" | "cl" => Some(Language::Lisp),
            "html" => Some(Language::Html),
            "txt" => Some(Language::Text),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Fortran => "fortran",
            Language::Ruby => "ruby",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Assembly => "assembly",
            Language::Lisp => "lisp",
            Language::Html => "html",
            Language::Text => "text",
        }
    }

    /// Whether a compile step precedes execution.
    pub fn needs_compile(&self) -> bool {
        matches!(
            self,
            Language::C
                | Language::Cpp
                | Language::Fortran
                | Language::Kotlin
                | Language::Swift
                | Language::Assembly
        )
    }

    /// Whether the runner should execute the file at all.
    pub fn is_runnable(&self) -> bool {
        !matches!(self, Language::Text)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
