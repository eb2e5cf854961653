// ABOUTME: Execution orchestration for the Codex pipeline
// ABOUTME: Sequences prompt building, generation, parsing, execution and preview

pub mod error;
pub mod task;
pub mod types;

pub use error::{EngineError, Result};
pub use task::{CodeEngineTask, RetryPolicy, TaskOptions};
pub use types::{EngineEvent, EngineOutcome, EngineRequest};
