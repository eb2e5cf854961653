// ABOUTME: Core type definitions for sandbox execution
// ABOUTME: Command results, streamed output chunks, and sandbox metadata

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Wall-clock ceiling for a single shell action.
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(300);

/// Which stream a command output chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
}

/// One chunk of live command output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChunk {
    pub stream: StreamType,
    pub data: String,
}

/// Options for running a command inside a sandbox.
///
/// When `output` is set, stdout/stderr chunks are delivered on the channel
/// while the command is still running; the channel closes when the command
/// finishes.
pub struct RunOptions {
    pub timeout: Duration,
    pub output: Option<mpsc::UnboundedSender<OutputChunk>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: SHELL_TIMEOUT,
            output: None,
        }
    }
}

/// Final result of a completed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Metadata for a file written into the sandbox filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrittenFile {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

/// Runtime information about a sandbox, used for the usage ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub started_at: String,
    pub end_at: String,
    pub memory_mb: u64,
    pub cpu_count: u32,
}
