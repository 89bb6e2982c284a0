//! Error handling for lodestar
//!
//! Centralized error types using thiserror. Engine code propagates these;
//! only the binary layer converts them into user-facing diagnostics.

use thiserror::Error;

/// Main error type for lodestar
#[derive(Error, Debug)]
pub enum LodestarError {
    /// IO errors (pipes, temp files, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A script payload could not be executed, or exited non-zero
    #[error("Script execution failed: {0}")]
    Script(String),

    /// A procedure payload reported a failure
    #[error("Procedure failed: {0}")]
    Procedure(String),

    /// System errors (external commands, hardware probes)
    #[error("System error: {0}")]
    System(String),

    /// State errors (missing pipes, invalid engine state)
    #[error("State error: {0}")]
    State(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for lodestar operations
pub type Result<T> = std::result::Result<T, LodestarError>;

// Convenient error constructors
impl LodestarError {
    /// Create a script execution error
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Create a procedure error
    pub fn procedure(msg: impl Into<String>) -> Self {
        Self::Procedure(msg.into())
    }

    /// Create a system error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}
