// ABOUTME: Core type definitions for execution tracking
// ABOUTME: Execution lifecycle, sandbox logs, code artifacts and usage records

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Execution lifecycle status.
///
/// PENDING -> STREAMING -> EXECUTING -> COMPLETED | FAILED. CANCELLED is a
/// terminal state set externally, never by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Streaming,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "pending" => Ok(Self::Pending),
            "streaming" => Ok(Self::Streaming),
            "executing" => Ok(Self::Executing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(StorageError::InvalidStatus(s.to_string())),
        }
    }
}

/// Source stream of a sandbox log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    System,
    Stdout,
    Stderr,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "system" => Ok(Self::System),
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            _ => Err(StorageError::InvalidStatus(s.to_string())),
        }
    }
}

/// One generation+run attempt. Owned exclusively by the orchestrator:
/// created at task start via idempotent upsert, mutated at every state
/// transition, never deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub status: ExecutionStatus,
    pub model: Option<String>,
    pub sandbox_template: Option<String>,
    pub generated_text: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub created_files: Vec<String>,
    pub preview_url: Option<String>,
    pub sandbox_id: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub exit_code: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for the idempotent execution upsert at task start.
#[derive(Debug, Clone)]
pub struct ExecutionSeed {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub model: Option<String>,
    pub sandbox_template: Option<String>,
}

/// Append-only log row tied to an execution. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLog {
    pub id: String,
    pub execution_id: String,
    pub log_type: LogType,
    pub content: String,
    pub sequence_number: i64,
    pub created_at: String,
}

impl SandboxLog {
    pub fn new(execution_id: &str, log_type: LogType, content: String, sequence_number: i64) -> Self {
        Self {
            id: nanoid::nanoid!(12),
            execution_id: execution_id.to_string(),
            log_type,
            content,
            sequence_number,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Persisted record of a single written file. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub id: String,
    pub execution_id: String,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: String,
}

impl CodeArtifact {
    pub fn new(execution_id: &str, file_path: &str, mime_type: &str, size_bytes: i64) -> Self {
        let file_name = file_path.rsplit('/').next().unwrap_or(file_path).to_string();
        Self {
            id: nanoid::nanoid!(12),
            execution_id: execution_id.to_string(),
            file_name,
            file_path: file_path.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Cost-ledger row written once per completed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub execution_id: String,
    pub memory_mb: i64,
    pub cpu_count: i64,
    pub duration_seconds: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub created_at: String,
}

impl UsageRecord {
    pub fn new(
        execution_id: &str,
        memory_mb: i64,
        cpu_count: i64,
        duration_seconds: i64,
        prompt_tokens: i64,
        completion_tokens: i64,
    ) -> Self {
        Self {
            id: nanoid::nanoid!(12),
            execution_id: execution_id.to_string(),
            memory_mb,
            cpu_count,
            duration_seconds,
            prompt_tokens,
            completion_tokens,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
