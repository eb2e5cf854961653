// ABOUTME: boltArtifact wire-format parsing for Codex
// ABOUTME: Tag scanner extracting ordered file-write and shell actions

pub mod parser;

pub use parser::{parse_actions, parse_artifact, ParsedAction, ParsedArtifact};
