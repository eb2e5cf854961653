// ABOUTME: The codeEngineTask state machine driving one execution
// ABOUTME: PENDING -> STREAMING -> EXECUTING -> COMPLETED | FAILED with bounded retries

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use codex_ai::{ChatMessage, GenerationError, GenerationOptions, GenerationResult, Generator};
use codex_artifact::parse_artifact;
use codex_config::{
    env_u64_in_range, env_usize_in_range, CODEX_ENGINE_EVENT_CHANNEL_SIZE, CODEX_TASK_TIMEOUT_SECS,
};
use codex_executions::{
    ExecutionSeed, ExecutionStatus, ExecutionStorage, LogWriter, UsageRecord,
};
use codex_prompts::{build_system_prompt, ConversationContext};
use codex_sandbox::{
    ActionExecutor, PortResolver, PortResolverConfig, Sandbox, SandboxError, SandboxProvider,
};

use crate::error::{EngineError, Result};
use crate::types::{EngineEvent, EngineOutcome, EngineRequest};

const DEFAULT_EVENT_CHANNEL_SIZE: usize = 200;
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 1800;

/// Bounded retry with multiplicative backoff for generation calls.
///
/// Retries live here, not in the client, so the retry budget is shared
/// across the whole pipeline rather than per network call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        (self.initial_backoff * factor).min(self.max_backoff)
    }
}

/// Tunables for one task instance.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Hard ceiling for the whole task; sub-budgets (shell timeout, port
    /// windows) live inside it.
    pub task_timeout: Duration,
    /// Lifetime requested for freshly created sandboxes.
    pub sandbox_timeout: Duration,
    pub generation: GenerationOptions,
    pub retry: RetryPolicy,
    pub resolver: PortResolverConfig,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(env_u64_in_range(
                CODEX_TASK_TIMEOUT_SECS,
                60..=7200,
                DEFAULT_TASK_TIMEOUT_SECS,
            )),
            sandbox_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            generation: GenerationOptions::default(),
            retry: RetryPolicy::default(),
            resolver: PortResolverConfig::from_env(),
        }
    }
}

/// Orchestrates one execution request end to end.
///
/// One long-lived async task per request; every await is sequential, so
/// actions apply in generation order and log rows land in event order.
pub struct CodeEngineTask {
    generator: Arc<dyn Generator>,
    sandboxes: Arc<dyn SandboxProvider>,
    storage: ExecutionStorage,
    options: TaskOptions,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl CodeEngineTask {
    pub fn new(
        generator: Arc<dyn Generator>,
        sandboxes: Arc<dyn SandboxProvider>,
        storage: ExecutionStorage,
    ) -> Self {
        Self::with_options(generator, sandboxes, storage, TaskOptions::default())
    }

    pub fn with_options(
        generator: Arc<dyn Generator>,
        sandboxes: Arc<dyn SandboxProvider>,
        storage: ExecutionStorage,
        options: TaskOptions,
    ) -> Self {
        let channel_size = env_usize_in_range(
            CODEX_ENGINE_EVENT_CHANNEL_SIZE,
            10..=10000,
            DEFAULT_EVENT_CHANNEL_SIZE,
        );
        let (event_tx, _) = broadcast::channel(channel_size);

        Self {
            generator,
            sandboxes,
            storage,
            options,
            event_tx,
        }
    }

    /// Subscribe to state transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Event delivery is best-effort; a missing subscriber never fails a run.
    fn broadcast_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) {
        if self.event_tx.receiver_count() == 0 {
            return;
        }
        let _ = self.event_tx.send(EngineEvent::StatusChanged {
            execution_id: execution_id.to_string(),
            status,
            error_message,
        });
    }

    /// Run one execution under the hard task ceiling. Every fatal path
    /// persists FAILED with the error message and completion timestamp
    /// before the error propagates, so no row is left dangling.
    pub async fn run(&self, request: EngineRequest) -> Result<EngineOutcome> {
        let seconds = self.options.task_timeout.as_secs();
        info!("Starting execution {} for project {}", request.run_id, request.project_id);

        match tokio::time::timeout(self.options.task_timeout, self.run_inner(&request)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout = EngineError::TaskTimeout { seconds };
                self.persist_failure(&request.run_id, &timeout).await;
                Err(timeout)
            }
        }
    }

    async fn run_inner(&self, request: &EngineRequest) -> Result<EngineOutcome> {
        match self.execute(request).await {
            Ok(outcome) => Ok(outcome),
            Err(failure) => {
                self.persist_failure(&request.run_id, &failure).await;
                Err(failure)
            }
        }
    }

    async fn persist_failure(&self, execution_id: &str, failure: &EngineError) {
        let message = failure.to_string();
        error!("Execution {} failed: {}", execution_id, message);
        if let Err(persist) = self.storage.mark_failed(execution_id, &message).await {
            error!(
                "Failed to persist failure for execution {}: {}",
                execution_id, persist
            );
        }
        self.broadcast_status(execution_id, ExecutionStatus::Failed, Some(message));
    }

    async fn execute(&self, request: &EngineRequest) -> Result<EngineOutcome> {
        let started = Instant::now();

        // PENDING: idempotent upsert keyed by the run id, so a task-runner
        // retry resets the same row instead of creating a duplicate.
        let mut generation_options = self.options.generation.clone();
        if let Some(model) = &request.model {
            generation_options.model = model.clone();
        }
        self.storage
            .upsert_execution(&ExecutionSeed {
                id: request.run_id.clone(),
                project_id: request.project_id.clone(),
                user_id: request.user_id.clone(),
                model: Some(generation_options.model.clone()),
                sandbox_template: request.sandbox_template.clone(),
            })
            .await?;
        self.broadcast_status(&request.run_id, ExecutionStatus::Pending, None);

        // PENDING -> STREAMING: build context and prompt, call generation
        self.storage.mark_streaming(&request.run_id).await?;
        self.broadcast_status(&request.run_id, ExecutionStatus::Streaming, None);

        let context = ConversationContext::new(
            request.conversation_turn,
            request.existing_files.clone(),
            &request.source_files,
            request.previous_error.clone(),
        );
        let messages = vec![
            ChatMessage::system(build_system_prompt(&context)),
            ChatMessage::user(request.prompt.clone()),
        ];

        let generation = self
            .generate_with_retry(&messages, &generation_options)
            .await?;
        self.storage
            .record_generation(
                &request.run_id,
                &generation.content,
                generation.prompt_tokens as i64,
                generation.completion_tokens as i64,
                generation.total_tokens as i64,
            )
            .await?;

        // STREAMING -> EXECUTING: parse actions; an empty result is a bad
        // generation and is never retried.
        let artifact = parse_artifact(&generation.content);
        if artifact.actions.is_empty() {
            return Err(EngineError::NoActions);
        }
        info!(
            "Execution {}: parsed {} actions ({})",
            request.run_id,
            artifact.actions.len(),
            artifact.title.as_deref().unwrap_or("untitled")
        );

        self.storage
            .update_status(&request.run_id, ExecutionStatus::Executing, None)
            .await?;
        self.broadcast_status(&request.run_id, ExecutionStatus::Executing, None);

        let logs = LogWriter::new(self.storage.clone(), request.run_id.clone());
        let sandbox = self.acquire_sandbox(request, &logs).await?;

        let executor = ActionExecutor::new(sandbox.as_ref(), &self.storage, &logs);
        let outcome = executor.apply(&artifact.actions).await?;
        if !outcome.errors.is_empty() {
            warn!(
                "Execution {}: {} of {} actions failed",
                request.run_id,
                outcome.errors.len(),
                artifact.actions.len()
            );
        }

        let resolver = PortResolver::new(self.options.resolver.clone());
        let preview = match resolver.resolve(sandbox.as_ref(), &logs).await {
            Ok(preview) => preview,
            Err(SandboxError::PortUndetected) => return Err(EngineError::PortDetectionFailed),
            Err(other) => return Err(other.into()),
        };

        // EXECUTING -> COMPLETED. Partial executor errors still complete,
        // with a non-zero exit code preserved for callers to inspect.
        let exit_code = if outcome.errors.is_empty() { 0 } else { 1 };
        let created_files: Vec<String> = outcome
            .created_files
            .iter()
            .map(|file| file.path.clone())
            .collect();

        self.storage
            .mark_completed(
                &request.run_id,
                &preview.url,
                &created_files,
                exit_code,
                sandbox.id(),
            )
            .await?;
        self.storage
            .update_project_pointer(&request.project_id, sandbox.id(), &request.run_id)
            .await?;
        self.record_usage(request, sandbox.as_ref(), &generation, started)
            .await;
        self.broadcast_status(&request.run_id, ExecutionStatus::Completed, None);

        info!(
            "Execution {} completed: {} files, preview {}",
            request.run_id,
            created_files.len(),
            preview.url
        );

        Ok(EngineOutcome {
            execution_id: request.run_id.clone(),
            sandbox_id: sandbox.id().to_string(),
            preview_url: preview.url,
            created_files,
            exit_code,
        })
    }

    /// Reconnect to the prior turn's sandbox when requested, falling back
    /// to a fresh one. Reuse is an optimization, not a correctness
    /// requirement, so reconnect failure never fails the run.
    async fn acquire_sandbox(
        &self,
        request: &EngineRequest,
        logs: &LogWriter,
    ) -> Result<Box<dyn Sandbox>> {
        if let Some(sandbox_id) = &request.reuse_sandbox_id {
            match self.sandboxes.connect(sandbox_id).await {
                Ok(sandbox) => {
                    logs.system(format!("Reconnected to sandbox {}", sandbox_id))
                        .await?;
                    return Ok(sandbox);
                }
                Err(reason) => {
                    warn!("Could not reconnect to sandbox {}: {}", sandbox_id, reason);
                    logs.system(format!(
                        "Warning: could not reconnect to sandbox {} ({}); creating a new sandbox",
                        sandbox_id, reason
                    ))
                    .await?;
                }
            }
        }

        let sandbox = self.sandboxes.create(self.options.sandbox_timeout).await?;
        logs.system(format!("Created sandbox {}", sandbox.id())).await?;
        Ok(sandbox)
    }

    async fn generate_with_retry(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        let policy = &self.options.retry;
        let mut attempt = 0;

        loop {
            match self.generator.generate(messages, options).await {
                Ok(result) => return Ok(result),
                // A missing credential cannot heal by waiting
                Err(GenerationError::MissingApiKey) => {
                    return Err(GenerationError::MissingApiKey.into());
                }
                Err(transient) => {
                    attempt += 1;
                    if attempt >= policy.max_attempts {
                        return Err(transient.into());
                    }
                    let delay = policy.backoff(attempt - 1);
                    warn!(
                        "Generation attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, policy.max_attempts, transient, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Usage is bookkeeping for a run that already completed; a ledger
    /// failure is logged, never surfaced.
    async fn record_usage(
        &self,
        request: &EngineRequest,
        sandbox: &dyn Sandbox,
        generation: &GenerationResult,
        started: Instant,
    ) {
        let info = match sandbox.get_info().await {
            Ok(info) => info,
            Err(reason) => {
                warn!(
                    "Could not fetch sandbox info for usage record: {}",
                    reason
                );
                return;
            }
        };

        let usage = UsageRecord::new(
            &request.run_id,
            info.memory_mb as i64,
            info.cpu_count as i64,
            started.elapsed().as_secs() as i64,
            generation.prompt_tokens as i64,
            generation.completion_tokens as i64,
        );
        if let Err(reason) = self.storage.record_usage(&usage).await {
            warn!("Could not record usage for {}: {}", request.run_id, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_multiplicative_and_bounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        // Bounded at the configured maximum
        assert_eq!(policy.backoff(6), Duration::from_secs(10));
    }
}
