// ABOUTME: Error types for sandbox operations
// ABOUTME: Covers the HTTP API, command execution, and port detection failures

use thiserror::Error;

/// Main error type for sandbox operations.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Transport-level failure talking to the sandbox API
    #[error("Sandbox request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Sandbox API returned a non-success status
    #[error("Sandbox API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Sandbox id does not resolve to a live sandbox
    #[error("Sandbox not found: {0}")]
    NotFound(String),

    /// Malformed payload from the sandbox API
    #[error("Sandbox protocol error: {0}")]
    Protocol(String),

    /// Shell action finished with a non-zero exit code
    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i64,
        stderr: String,
    },

    /// Command exceeded its wall-clock ceiling
    #[error("Command timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Port detection exhausted both the warm-up and grace windows
    #[error("No listening port detected in sandbox")]
    PortUndetected,

    /// Invalid provider configuration
    #[error("Invalid sandbox configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persistence failure while logging or recording artifacts
    #[error("Storage error: {0}")]
    Storage(#[from] codex_executions::StorageError),
}

/// Type alias for Results that return SandboxError.
pub type Result<T> = std::result::Result<T, SandboxError>;
