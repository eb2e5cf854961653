// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Codex

// Generation endpoint configuration
pub const CODEX_GENERATION_API_KEY: &str = "CODEX_GENERATION_API_KEY";
pub const CODEX_GENERATION_API_URL: &str = "CODEX_GENERATION_API_URL";
pub const CODEX_GENERATION_MODEL: &str = "CODEX_GENERATION_MODEL";

// Sandbox API configuration
pub const CODEX_SANDBOX_API_KEY: &str = "CODEX_SANDBOX_API_KEY";
pub const CODEX_SANDBOX_API_URL: &str = "CODEX_SANDBOX_API_URL";
pub const CODEX_SANDBOX_TEMPLATE: &str = "CODEX_SANDBOX_TEMPLATE";
pub const CODEX_SANDBOX_TIMEOUT_MINUTES: &str = "CODEX_SANDBOX_TIMEOUT_MINUTES";

// Engine task configuration
pub const CODEX_TASK_TIMEOUT_SECS: &str = "CODEX_TASK_TIMEOUT_SECS";
pub const CODEX_ENGINE_EVENT_CHANNEL_SIZE: &str = "CODEX_ENGINE_EVENT_CHANNEL_SIZE";

// Port detection configuration
pub const CODEX_PORT_WARMUP_SECS: &str = "CODEX_PORT_WARMUP_SECS";
pub const CODEX_PORT_GRACE_SECS: &str = "CODEX_PORT_GRACE_SECS";
