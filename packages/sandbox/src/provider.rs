// ABOUTME: Collaborator traits for ephemeral remote sandboxes
// ABOUTME: Abstract interface over sandbox lifecycle, filesystem and commands

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecResult, RunOptions, SandboxInfo, WrittenFile};

/// Provider of ephemeral sandboxes. Reconnecting by id is how conversation
/// turns reuse a still-alive sandbox; reuse is an optimization, so callers
/// fall back to `create` when `connect` fails.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Reconnect to an existing sandbox by id.
    async fn connect(&self, sandbox_id: &str) -> Result<Box<dyn Sandbox>>;

    /// Create a fresh sandbox with the given lifetime.
    async fn create(&self, timeout: Duration) -> Result<Box<dyn Sandbox>>;
}

/// A live remote sandbox.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    async fn make_dir(&self, path: &str) -> Result<()>;

    /// Write a file, creating it if absent and replacing it otherwise.
    async fn write_file(&self, path: &str, content: &str) -> Result<WrittenFile>;

    /// Run a shell command. Output chunks stream through
    /// `options.output` while the command runs; the returned result carries
    /// the full captured streams and the exit code.
    async fn run_command(&self, command: &str, options: RunOptions) -> Result<ExecResult>;

    /// Externally reachable hostname for a port inside the sandbox.
    async fn get_host(&self, port: u16) -> Result<String>;

    async fn get_info(&self) -> Result<SandboxInfo>;
}
