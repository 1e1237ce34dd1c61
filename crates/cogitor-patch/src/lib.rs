//! Cogitor patch application.
//!
//! This crate provides:
//! - the path sandbox binding every write to the working root
//! - the fuzzy diff engine: smart range resolution, 70% validation,
//!   reverse-order application, and per-patch partial success

pub mod diff;
pub mod error;
pub mod sandbox;

pub use diff::{ApplyPrompt, BatchReport, DiffEngine, FileOutcome, FileReport};
pub use error::{PatchError, PatchResult};
pub use sandbox::{PathSandbox, SandboxError};
