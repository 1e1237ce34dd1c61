//! Error types for patch application

use thiserror::Error;

use crate::sandbox::SandboxError;

/// Patch application error type
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("path validation failed: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no diff blocks to apply")]
    EmptyBatch,

    #[error("no valid patches for {path}")]
    NoValidPatches { path: String },

    #[error("operator declined partial application for {path}")]
    OperatorDeclined { path: String },

    #[error("no patches were applied to {path}")]
    NoneApplied { path: String },
}

/// Result type for patch operations
pub type PatchResult<T> = Result<T, PatchError>;
