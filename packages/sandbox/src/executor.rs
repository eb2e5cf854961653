// ABOUTME: Applies parsed file/shell actions against a live sandbox
// ABOUTME: Every side effect is logged; one failing action never aborts the batch

use tokio::sync::mpsc;
use tracing::{info, warn};

use codex_artifact::ParsedAction;
use codex_executions::{CodeArtifact, ExecutionStorage, LogWriter};

use crate::error::{Result, SandboxError};
use crate::mime::mime_for_path;
use crate::provider::Sandbox;
use crate::types::{OutputChunk, RunOptions, StreamType, SHELL_TIMEOUT};

/// A file written by the executor, with its UTF-8 byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedFile {
    pub path: String,
    pub size: usize,
}

/// One failed action: which action and why.
#[derive(Debug, Clone)]
pub struct ActionError {
    pub action: String,
    pub error: String,
}

/// Result of applying an action batch. A non-empty `errors` list means the
/// run partially failed even though the batch completed.
#[derive(Debug, Default)]
pub struct ExecutorOutcome {
    pub created_files: Vec<CreatedFile>,
    pub executed_commands: Vec<String>,
    pub errors: Vec<ActionError>,
}

/// Realizes a parsed action list against a sandbox, sequentially and in
/// generation order - later actions may depend on files created by earlier
/// ones, so there is no parallel fan-out.
pub struct ActionExecutor<'a> {
    sandbox: &'a dyn Sandbox,
    storage: &'a ExecutionStorage,
    logs: &'a LogWriter,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(sandbox: &'a dyn Sandbox, storage: &'a ExecutionStorage, logs: &'a LogWriter) -> Self {
        Self {
            sandbox,
            storage,
            logs,
        }
    }

    /// Apply the batch. Individual action failures are caught, logged as
    /// stderr rows and accumulated; only persistence failures while
    /// recording the error itself abort the batch.
    pub async fn apply(&self, actions: &[ParsedAction]) -> Result<ExecutorOutcome> {
        let mut outcome = ExecutorOutcome::default();

        for action in actions {
            let result = match action {
                ParsedAction::File { path, content } => {
                    self.apply_file(path, content, &mut outcome).await
                }
                ParsedAction::Shell { command } => self.apply_shell(command, &mut outcome).await,
            };

            if let Err(error) = result {
                let label = action.describe();
                warn!("Action {} failed: {}", label, error);
                self.logs
                    .stderr(format!("Action {} failed: {}", label, error))
                    .await?;
                outcome.errors.push(ActionError {
                    action: label,
                    error: error.to_string(),
                });
            }
        }

        info!(
            "Executor finished: {} files, {} commands, {} errors",
            outcome.created_files.len(),
            outcome.executed_commands.len(),
            outcome.errors.len()
        );
        Ok(outcome)
    }

    async fn apply_file(
        &self,
        path: &str,
        content: &str,
        outcome: &mut ExecutorOutcome,
    ) -> Result<()> {
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !self.sandbox.file_exists(parent).await? {
                self.sandbox.make_dir(parent).await?;
                self.logs
                    .system(format!("Created directory {}", parent))
                    .await?;
            }
        }

        self.sandbox.write_file(path, content).await?;

        // Byte size from the UTF-8 encoding, not the character count
        let size = content.len();
        let artifact = CodeArtifact::new(
            self.logs.execution_id(),
            path,
            mime_for_path(path),
            size as i64,
        );
        self.storage.create_artifact(&artifact).await?;
        self.logs
            .system(format!("Wrote {} ({} bytes)", path, size))
            .await?;

        outcome.created_files.push(CreatedFile {
            path: path.to_string(),
            size,
        });
        Ok(())
    }

    async fn apply_shell(&self, command: &str, outcome: &mut ExecutorOutcome) -> Result<()> {
        self.logs.system(format!("Executing: {}", command)).await?;

        // Chunks are persisted while the command is still running; the
        // drain task is awaited before the exit-code row so log order
        // matches event order.
        let (tx, mut rx) = mpsc::unbounded_channel::<OutputChunk>();
        let drain_logs = self.logs.clone();
        let drain = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                let persisted = match chunk.stream {
                    StreamType::Stdout => drain_logs.stdout(chunk.data).await,
                    StreamType::Stderr => drain_logs.stderr(chunk.data).await,
                };
                if let Err(error) = persisted {
                    warn!("Failed to persist output chunk: {}", error);
                }
            }
        });

        let run_result = self
            .sandbox
            .run_command(
                command,
                RunOptions {
                    timeout: SHELL_TIMEOUT,
                    output: Some(tx),
                },
            )
            .await;

        // Sender was moved into the command call, so the channel is closed
        // by the time the command returns and the drain terminates.
        let _ = drain.await;

        let exec = run_result?;
        self.logs
            .system(format!("Command exited with code {}", exec.exit_code))
            .await?;
        outcome.executed_commands.push(command.to_string());

        if exec.exit_code != 0 {
            return Err(SandboxError::CommandFailed {
                command: command.to_string(),
                exit_code: exec.exit_code,
                stderr: exec.stderr,
            });
        }

        Ok(())
    }
}
