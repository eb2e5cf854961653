// ABOUTME: Prompt construction for the Codex generation pipeline
// ABOUTME: Assembles bounded-size system prompts from conversation context

pub mod builder;
pub mod context;
mod templates;

pub use builder::build_system_prompt;
pub use context::{
    estimate_tokens, select_context_files, truncate_to_budget, ContextFile, ConversationContext,
    SourceFile, MAX_CONTEXT_FILES, MAX_FILE_TOKENS, MAX_TOTAL_FILE_TOKENS, MODEL_TOKEN_CEILING,
};
