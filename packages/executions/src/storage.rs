// ABOUTME: Database storage operations for executions, logs, artifacts and usage
// ABOUTME: Provides the persistence interface consumed by the engine and executor

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::debug;

use crate::types::{
    CodeArtifact, Execution, ExecutionSeed, ExecutionStatus, LogType, SandboxLog, UsageRecord,
};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Execution not found: {0}")]
    NotFound(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Storage layer for the execution pipeline.
#[derive(Clone)]
pub struct ExecutionStorage {
    pool: SqlitePool,
}

impl ExecutionStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== Execution Operations ====================

    /// Create or reset an execution row, keyed by the idempotent run id.
    ///
    /// A retry of the same logical unit reuses the same id: the second
    /// upsert resets the row to pending and clears any prior error or
    /// result columns instead of creating a duplicate.
    pub async fn upsert_execution(&self, seed: &ExecutionSeed) -> Result<Execution> {
        let timestamp = now();
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, project_id, user_id, status, model, sandbox_template,
                created_at, updated_at
            ) VALUES (?, ?, ?, 'pending', ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = 'pending',
                model = excluded.model,
                sandbox_template = excluded.sandbox_template,
                error_message = NULL,
                completed_at = NULL,
                exit_code = NULL,
                preview_url = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&seed.id)
        .bind(&seed.project_id)
        .bind(&seed.user_id)
        .bind(&seed.model)
        .bind(&seed.sandbox_template)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        self.get_execution(&seed.id).await
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<Execution> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, user_id, status, model, sandbox_template,
                   generated_text, prompt_tokens, completion_tokens, total_tokens,
                   created_files, preview_url, sandbox_id, started_at,
                   completed_at, exit_code, error_message, created_at, updated_at
            FROM executions
            WHERE id = ?
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(execution_id.to_string()))?;

        Self::row_to_execution(row)
    }

    /// Transition to streaming and record the start time.
    pub async fn mark_streaming(&self, execution_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = 'streaming', started_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now())
        .bind(now())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(now())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist the raw generation output and token counts.
    pub async fn record_generation(
        &self,
        execution_id: &str,
        generated_text: &str,
        prompt_tokens: i64,
        completion_tokens: i64,
        total_tokens: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE executions
            SET generated_text = ?, prompt_tokens = ?, completion_tokens = ?,
                total_tokens = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(generated_text)
        .bind(prompt_tokens)
        .bind(completion_tokens)
        .bind(total_tokens)
        .bind(now())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal success transition: preview URL, created file paths, exit
    /// code and sandbox id land together with the completion timestamp.
    pub async fn mark_completed(
        &self,
        execution_id: &str,
        preview_url: &str,
        created_files: &[String],
        exit_code: i64,
        sandbox_id: &str,
    ) -> Result<()> {
        let files_json = serde_json::to_string(created_files)?;
        sqlx::query(
            r#"
            UPDATE executions
            SET status = 'completed', preview_url = ?, created_files = ?,
                exit_code = ?, sandbox_id = ?, completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(preview_url)
        .bind(files_json)
        .bind(exit_code)
        .bind(sandbox_id)
        .bind(now())
        .bind(now())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal failure transition. Always sets the completion timestamp so
    /// no row is ever left dangling in a non-terminal status.
    pub async fn mark_failed(&self, execution_id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = 'failed', error_message = ?, completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error_message)
        .bind(now())
        .bind(now())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Log Operations ====================

    pub async fn append_log(&self, log: &SandboxLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sandbox_logs (
                id, execution_id, log_type, content, sequence_number, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.execution_id)
        .bind(log.log_type.as_str())
        .bind(&log.content)
        .bind(log.sequence_number)
        .bind(&log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_logs(&self, execution_id: &str) -> Result<Vec<SandboxLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, execution_id, log_type, content, sequence_number, created_at
            FROM sandbox_logs
            WHERE execution_id = ?
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let log_type: String = row.get("log_type");
                Ok(SandboxLog {
                    id: row.get("id"),
                    execution_id: row.get("execution_id"),
                    log_type: LogType::parse(&log_type)?,
                    content: row.get("content"),
                    sequence_number: row.get("sequence_number"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    // ==================== Artifact Operations ====================

    pub async fn create_artifact(&self, artifact: &CodeArtifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO code_artifacts (
                id, execution_id, file_name, file_path, mime_type, size_bytes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&artifact.id)
        .bind(&artifact.execution_id)
        .bind(&artifact.file_name)
        .bind(&artifact.file_path)
        .bind(&artifact.mime_type)
        .bind(artifact.size_bytes)
        .bind(&artifact.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_artifacts(&self, execution_id: &str) -> Result<Vec<CodeArtifact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, execution_id, file_name, file_path, mime_type, size_bytes, created_at
            FROM code_artifacts
            WHERE execution_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CodeArtifact {
                id: row.get("id"),
                execution_id: row.get("execution_id"),
                file_name: row.get("file_name"),
                file_path: row.get("file_path"),
                mime_type: row.get("mime_type"),
                size_bytes: row.get("size_bytes"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    // ==================== Project Pointer ====================

    /// Update the owning project's sandbox pointer after a successful run
    /// so future conversation turns can reuse the same sandbox. A weak
    /// back-reference, never ownership.
    pub async fn update_project_pointer(
        &self,
        project_id: &str,
        sandbox_id: &str,
        execution_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE projects
            SET active_sandbox_id = ?, current_execution_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(sandbox_id)
        .bind(execution_id)
        .bind(now())
        .bind(project_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn project_pointer(
        &self,
        project_id: &str,
    ) -> Result<Option<(Option<String>, Option<String>)>> {
        let row = sqlx::query(
            "SELECT active_sandbox_id, current_execution_id FROM projects WHERE id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| (r.get("active_sandbox_id"), r.get("current_execution_id"))))
    }

    // ==================== Usage Ledger ====================

    pub async fn record_usage(&self, usage: &UsageRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (
                id, execution_id, memory_mb, cpu_count, duration_seconds,
                prompt_tokens, completion_tokens, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&usage.id)
        .bind(&usage.execution_id)
        .bind(usage.memory_mb)
        .bind(usage.cpu_count)
        .bind(usage.duration_seconds)
        .bind(usage.prompt_tokens)
        .bind(usage.completion_tokens)
        .bind(&usage.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_usage(&self, execution_id: &str) -> Result<Option<UsageRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, execution_id, memory_mb, cpu_count, duration_seconds,
                   prompt_tokens, completion_tokens, created_at
            FROM usage_records
            WHERE execution_id = ?
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UsageRecord {
            id: r.get("id"),
            execution_id: r.get("execution_id"),
            memory_mb: r.get("memory_mb"),
            cpu_count: r.get("cpu_count"),
            duration_seconds: r.get("duration_seconds"),
            prompt_tokens: r.get("prompt_tokens"),
            completion_tokens: r.get("completion_tokens"),
            created_at: r.get("created_at"),
        }))
    }

    fn row_to_execution(row: sqlx::sqlite::SqliteRow) -> Result<Execution> {
        let status: String = row.get("status");
        let created_files: Option<String> = row.get("created_files");
        let created_files = created_files
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        Ok(Execution {
            id: row.get("id"),
            project_id: row.get("project_id"),
            user_id: row.get("user_id"),
            status: ExecutionStatus::parse(&status)?,
            model: row.get("model"),
            sandbox_template: row.get("sandbox_template"),
            generated_text: row.get("generated_text"),
            prompt_tokens: row.get("prompt_tokens"),
            completion_tokens: row.get("completion_tokens"),
            total_tokens: row.get("total_tokens"),
            created_files,
            preview_url: row.get("preview_url"),
            sandbox_id: row.get("sandbox_id"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            exit_code: row.get("exit_code"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

/// Sequenced log writer for one execution.
///
/// Sequence numbers are assigned from a shared monotonic counter and every
/// insert is awaited before the caller moves on, so persisted order equals
/// event order even when one writer clone streams command output while
/// another records system events.
#[derive(Clone)]
pub struct LogWriter {
    storage: ExecutionStorage,
    execution_id: String,
    sequence: Arc<AtomicI64>,
}

impl LogWriter {
    pub fn new(storage: ExecutionStorage, execution_id: impl Into<String>) -> Self {
        Self {
            storage,
            execution_id: execution_id.into(),
            sequence: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub async fn append(&self, log_type: LogType, content: impl Into<String>) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let log = SandboxLog::new(&self.execution_id, log_type, content.into(), sequence);
        debug!(
            "log[{}] {} #{}: {}",
            self.execution_id,
            log.log_type.as_str(),
            sequence,
            log.content
        );
        self.storage.append_log(&log).await
    }

    pub async fn system(&self, content: impl Into<String>) -> Result<()> {
        self.append(LogType::System, content).await
    }

    pub async fn stdout(&self, content: impl Into<String>) -> Result<()> {
        self.append(LogType::Stdout, content).await
    }

    pub async fn stderr(&self, content: impl Into<String>) -> Result<()> {
        self.append(LogType::Stderr, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIGRATOR;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_storage() -> ExecutionStorage {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create test database");
        MIGRATOR.run(&pool).await.expect("Failed to run migrations");
        ExecutionStorage::new(pool)
    }

    fn seed(id: &str) -> ExecutionSeed {
        ExecutionSeed {
            id: id.to_string(),
            project_id: "proj-1".to_string(),
            user_id: "user-1".to_string(),
            model: Some("test-model".to_string()),
            sandbox_template: Some("node".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        // A second upsert with the same run id does not create a second
        // row and resets status to pending, clearing the prior error.
        let storage = test_storage().await;

        let first = storage.upsert_execution(&seed("run-1")).await.unwrap();
        assert_eq!(first.status, ExecutionStatus::Pending);

        storage.mark_failed("run-1", "boom").await.unwrap();
        let failed = storage.get_execution("run-1").await.unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));

        let second = storage.upsert_execution(&seed("run-1")).await.unwrap();
        assert_eq!(second.status, ExecutionStatus::Pending);
        assert!(second.error_message.is_none());
        assert!(second.completed_at.is_none());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM executions")
            .fetch_one(&storage.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_status_transitions_persist() {
        let storage = test_storage().await;
        storage.upsert_execution(&seed("run-2")).await.unwrap();

        storage.mark_streaming("run-2").await.unwrap();
        let streaming = storage.get_execution("run-2").await.unwrap();
        assert_eq!(streaming.status, ExecutionStatus::Streaming);
        assert!(streaming.started_at.is_some());

        storage
            .record_generation("run-2", "<boltArtifact/>", 100, 50, 150)
            .await
            .unwrap();
        storage
            .update_status("run-2", ExecutionStatus::Executing, None)
            .await
            .unwrap();

        storage
            .mark_completed(
                "run-2",
                "https://3000-sbx.example.dev",
                &["package.json".to_string()],
                0,
                "sbx-1",
            )
            .await
            .unwrap();

        let done = storage.get_execution("run-2").await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.created_files, vec!["package.json".to_string()]);
        assert_eq!(done.exit_code, Some(0));
        assert_eq!(done.total_tokens, Some(150));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_log_writer_orders_rows() {
        let storage = test_storage().await;
        storage.upsert_execution(&seed("run-3")).await.unwrap();

        let writer = LogWriter::new(storage.clone(), "run-3");
        writer.system("Executing: npm test").await.unwrap();
        writer.stdout("a").await.unwrap();
        writer.stdout("b").await.unwrap();
        writer.system("Command exited with code 0").await.unwrap();

        let logs = storage.get_logs("run-3").await.unwrap();
        let entries: Vec<(LogType, &str)> = logs
            .iter()
            .map(|l| (l.log_type, l.content.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (LogType::System, "Executing: npm test"),
                (LogType::Stdout, "a"),
                (LogType::Stdout, "b"),
                (LogType::System, "Command exited with code 0"),
            ]
        );
    }

    #[tokio::test]
    async fn test_project_pointer_update() {
        let storage = test_storage().await;
        sqlx::query("INSERT INTO projects (id, name) VALUES ('proj-1', 'Demo')")
            .execute(&storage.pool)
            .await
            .unwrap();

        storage
            .update_project_pointer("proj-1", "sbx-9", "run-9")
            .await
            .unwrap();

        let pointer = storage.project_pointer("proj-1").await.unwrap().unwrap();
        assert_eq!(pointer.0.as_deref(), Some("sbx-9"));
        assert_eq!(pointer.1.as_deref(), Some("run-9"));
    }

    #[tokio::test]
    async fn test_artifact_round_trip() {
        let storage = test_storage().await;
        storage.upsert_execution(&seed("run-4")).await.unwrap();

        let artifact = CodeArtifact::new("run-4", "src/main.tsx", "text/typescript", 42);
        storage.create_artifact(&artifact).await.unwrap();

        let artifacts = storage.list_artifacts("run-4").await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name, "main.tsx");
        assert_eq!(artifacts[0].size_bytes, 42);
    }
}
