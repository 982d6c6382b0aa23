//! Error types returned at pass, configuration and serialization boundaries.
//!
//! Recoverable problems never surface here; they are diagnostics carried
//! alongside a best-effort module (see [`crate::diagnostics`]).

use crate::diagnostics::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Error returned by a module pass or the pass pipeline.
#[derive(Debug, Error)]
pub enum PassError {
    /// A structural precondition of the IR was broken while the pass ran
    #[error("{pass}: invariant violation\n{rendered}")]
    InvariantViolation {
        pass: String,
        rendered: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// The pipeline stopped because a pass reported errors and gating is on
    #[error("{pass} reported {count} error(s); pipeline halted")]
    Gated { pass: String, count: usize },
}

/// Result type for pass operations
pub type PassResult<T> = Result<T, PassError>;

/// Error loading a pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Error reading or writing the JSON module format.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported module format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// A node refers to a child that is not defined before it
    #[error("node {node} refers to undefined node {child}")]
    DanglingNode { node: usize, child: usize },

    /// A module entry or type record refers to a node that does not exist
    #[error("reference to undefined node {0}")]
    UnknownNode(usize),

    /// A function entry does not point at a function node
    #[error("entry '{0}' is not a function node")]
    NotAFunction(String),
}
