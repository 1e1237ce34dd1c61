//! Path containment against the working root.
//!
//! Every write target in the system goes through [`PathSandbox::resolve`].
//! After a successful resolve, any write stays strictly inside the root.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("path escapes the working directory: {0}")]
    Outside(PathBuf),

    #[error("home directory is not available")]
    NoHomeDir,

    #[error("io error resolving {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolves raw paths from queries and LLM replies into absolute paths
/// contained in the working root.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Create a sandbox rooted at `root`. The root is canonicalized so
    /// containment checks survive symlinked working directories.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|source| SandboxError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Sandbox rooted at the process working directory.
    pub fn current_dir() -> Result<Self, SandboxError> {
        let cwd = std::env::current_dir().map_err(|source| SandboxError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Self::new(cwd)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a raw path to an absolute path inside the root, or fail with
    /// `Outside`. `~/` expands against the home directory; symlinks are
    /// resolved when the target exists; for missing targets the parent
    /// directory is checked instead.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        let expanded = self.expand_home(raw)?;
        let cleaned = normalize_lexically(&expanded);

        let full = if cleaned.is_absolute() {
            if !cleaned.starts_with(&self.root) {
                return Err(SandboxError::Outside(cleaned));
            }
            cleaned
        } else {
            normalize_lexically(&self.root.join(cleaned))
        };

        match full.canonicalize() {
            Ok(resolved) => {
                if !resolved.starts_with(&self.root) {
                    return Err(SandboxError::Outside(resolved));
                }
                Ok(full)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // Target does not exist yet; the parent decides containment.
                let parent = full.parent().unwrap_or(&self.root);
                let parent_resolved = match parent.canonicalize() {
                    Ok(p) => p,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        normalize_lexically(parent)
                    }
                    Err(e) => {
                        return Err(SandboxError::Io {
                            path: parent.to_path_buf(),
                            source: e,
                        })
                    }
                };
                if !parent_resolved.starts_with(&self.root) {
                    return Err(SandboxError::Outside(full));
                }
                Ok(full)
            }
            Err(source) => Err(SandboxError::Io { path: full, source }),
        }
    }

    fn expand_home(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        if let Some(rest) = raw.strip_prefix("~/") {
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or(SandboxError::NoHomeDir)?;
            Ok(home.join(rest))
        } else {
            Ok(PathBuf::from(raw))
        }
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
/// `..` at the start of a relative path is kept so escapes stay visible.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
