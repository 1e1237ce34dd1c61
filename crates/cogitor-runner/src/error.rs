//! Error types for the build/run engine

use cogitor_patch::PatchError;
use cogitor_runtime::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("install command failed: {0}")]
    InstallFailed(String),

    #[error("dependency installation declined by operator")]
    InstallDeclined,

    #[error("no entry point found")]
    NoEntryPoint,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("build failed after {attempts} attempts, last error: {last_error}")]
    BuildExhausted { attempts: u32, last_error: String },

    #[error("partially repaired ({fixes} fixes over {attempts} attempts) but errors remain: {last_error}")]
    PartialRepair {
        fixes: u32,
        attempts: u32,
        last_error: String,
    },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
