// ABOUTME: In-memory stub sandbox for executor and port-resolver tests
// ABOUTME: Records filesystem/command calls and replays canned responses

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;

use codex_executions::{ExecutionSeed, ExecutionStorage, LogWriter, MIGRATOR};
use codex_sandbox::{
    ExecResult, OutputChunk, Result, RunOptions, Sandbox, SandboxInfo, WrittenFile,
};

/// Canned response for one command prefix.
#[derive(Debug, Clone, Default)]
pub struct StubExec {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub chunks: Vec<OutputChunk>,
}

/// A sandbox double that records every call and replays canned command
/// responses, first prefix match wins.
pub struct StubSandbox {
    pub id: String,
    pub host: String,
    pub dirs: Mutex<HashSet<String>>,
    pub written: Mutex<Vec<(String, String)>>,
    pub ran: Mutex<Vec<String>>,
    pub responses: Vec<(String, StubExec)>,
    pub default_exec: StubExec,
}

impl StubSandbox {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            host: format!("3000-{}.sandbox.codex.dev", id),
            dirs: Mutex::new(HashSet::new()),
            written: Mutex::new(Vec::new()),
            ran: Mutex::new(Vec::new()),
            responses: Vec::new(),
            default_exec: StubExec::default(),
        }
    }

    pub fn respond(mut self, prefix: &str, exec: StubExec) -> Self {
        self.responses.push((prefix.to_string(), exec));
        self
    }
}

#[async_trait]
impl Sandbox for StubSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.dirs.lock().unwrap().contains(path))
    }

    async fn make_dir(&self, path: &str) -> Result<()> {
        self.dirs.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<WrittenFile> {
        self.written
            .lock()
            .unwrap()
            .push((path.to_string(), content.to_string()));
        Ok(WrittenFile {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            file_type: "file".to_string(),
        })
    }

    async fn run_command(&self, command: &str, options: RunOptions) -> Result<ExecResult> {
        self.ran.lock().unwrap().push(command.to_string());

        let exec = self
            .responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, exec)| exec.clone())
            .unwrap_or_else(|| self.default_exec.clone());

        if let Some(sender) = &options.output {
            for chunk in &exec.chunks {
                let _ = sender.send(chunk.clone());
            }
        }

        Ok(ExecResult {
            exit_code: exec.exit_code,
            stdout: exec.stdout,
            stderr: exec.stderr,
        })
    }

    async fn get_host(&self, _port: u16) -> Result<String> {
        Ok(self.host.clone())
    }

    async fn get_info(&self) -> Result<SandboxInfo> {
        Ok(SandboxInfo {
            started_at: "2026-01-01T00:00:00Z".to_string(),
            end_at: "2026-01-01T00:10:00Z".to_string(),
            memory_mb: 2048,
            cpu_count: 2,
        })
    }
}

/// In-memory database plus a pending execution row and its log writer.
pub async fn test_harness(execution_id: &str) -> (ExecutionStorage, LogWriter) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory database");
    MIGRATOR.run(&pool).await.expect("Failed to run migrations");

    let storage = ExecutionStorage::new(pool);
    storage
        .upsert_execution(&ExecutionSeed {
            id: execution_id.to_string(),
            project_id: "proj-1".to_string(),
            user_id: "user-1".to_string(),
            model: None,
            sandbox_template: None,
        })
        .await
        .expect("Failed to seed execution");

    let logs = LogWriter::new(storage.clone(), execution_id);
    (storage, logs)
}
