// ABOUTME: Sandbox integration for the Codex engine
// ABOUTME: Collaborator traits, HTTP provider, action executor and port resolver

pub mod error;
pub mod executor;
pub mod http;
pub mod mime;
pub mod ports;
pub mod provider;
pub mod types;

pub use error::{Result, SandboxError};
pub use executor::{ActionError, ActionExecutor, CreatedFile, ExecutorOutcome};
pub use http::{HttpSandbox, HttpSandboxProvider};
pub use mime::mime_for_path;
pub use ports::{PortResolver, PortResolverConfig, ResolvedPreview};
pub use provider::{Sandbox, SandboxProvider};
pub use types::{ExecResult, OutputChunk, RunOptions, SandboxInfo, StreamType, WrittenFile};
