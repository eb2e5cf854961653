// ABOUTME: Execution persistence for the Codex engine
// ABOUTME: SQLite storage for executions, sandbox logs, code artifacts and usage

pub mod storage;
pub mod types;

pub use storage::{ExecutionStorage, LogWriter, StorageError};
pub use types::{
    CodeArtifact, Execution, ExecutionSeed, ExecutionStatus, LogType, SandboxLog, UsageRecord,
};

/// Embedded migrations so consumers (and tests) can bring up a database
/// without shipping the SQL files separately.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
