// ABOUTME: Generation endpoint integration for Codex
// ABOUTME: Chat-completion client, message types, and token usage metrics

pub mod service;

pub use service::{
    ChatMessage, GenerationClient, GenerationError, GenerationOptions, GenerationResult,
    Generator, MessageRole,
};
