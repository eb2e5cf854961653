// ABOUTME: Top-level error taxonomy for the execution orchestrator
// ABOUTME: Exhaustive over every failure boundary the state machine crosses

use thiserror::Error;

use codex_ai::GenerationError;
use codex_executions::StorageError;
use codex_sandbox::SandboxError;

/// Errors surfaced by the orchestrator. Each external-call boundary maps to
/// its own variant so retry-vs-fail-fast branching stays exhaustive and
/// checked at compile time.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Generation call failed after the retry budget was exhausted
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The generation produced no parseable actions. Fatal and never
    /// retried: re-running would reproduce the same malformed output.
    #[error("No actions to execute")]
    NoActions,

    /// Port detection exhausted both windows. The most common root cause
    /// is the generated app itself failing to start.
    #[error("Dev server port was not detected; check the captured dev-server logs for startup failures")]
    PortDetectionFailed,

    /// Sandbox API or command failure
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The whole task hit its hard wall-clock ceiling
    #[error("Execution timed out after {seconds} seconds")]
    TaskTimeout { seconds: u64 },
}

pub type Result<T> = std::result::Result<T, EngineError>;
