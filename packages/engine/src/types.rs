// ABOUTME: Request, outcome and event types for the execution orchestrator
// ABOUTME: The request is the payload an upstream API enqueues per conversation turn

use serde::{Deserialize, Serialize};

use codex_executions::ExecutionStatus;
use codex_prompts::SourceFile;

/// One unit of work: a conversation turn to turn into a running preview.
///
/// `run_id` is the idempotent key for the Execution row, so a task-runner
/// retry of the same logical unit reuses the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub run_id: String,
    pub project_id: String,
    pub user_id: String,
    /// The user's natural language message for this turn.
    pub prompt: String,
    /// 1-indexed turn number; 1 means fresh project.
    pub conversation_turn: u32,
    pub existing_files: Vec<String>,
    pub source_files: Vec<SourceFile>,
    pub previous_error: Option<String>,
    /// Prior turn's sandbox to reconnect to, if the caller wants reuse.
    pub reuse_sandbox_id: Option<String>,
    pub model: Option<String>,
    pub sandbox_template: Option<String>,
}

/// Result of a completed run. A non-zero `exit_code` means some actions
/// errored even though the run completed - callers inspect the logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOutcome {
    pub execution_id: String,
    pub sandbox_id: String,
    pub preview_url: String,
    pub created_files: Vec<String>,
    pub exit_code: i64,
}

/// State transitions published on the engine's broadcast channel so a
/// push-based transport can attach without touching the state machine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StatusChanged {
        execution_id: String,
        status: ExecutionStatus,
        error_message: Option<String>,
    },
}
