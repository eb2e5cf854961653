// ABOUTME: Conversation context assembly with token budgeting
// ABOUTME: Ranks, selects and truncates project files to fit the prompt budget

use serde::{Deserialize, Serialize};

/// Heuristic: roughly four characters per token.
const CHARS_PER_TOKEN: usize = 4;

/// Hard ceiling of the upstream generation endpoint.
pub const MODEL_TOKEN_CEILING: usize = 8192;

/// Budget for a single inlined file, after truncation.
pub const MAX_FILE_TOKENS: usize = 400;

/// Aggregate budget across all inlined files.
pub const MAX_TOTAL_FILE_TOKENS: usize = 3000;

/// At most this many files are inlined; the rest are referenced by path.
pub const MAX_CONTEXT_FILES: usize = 8;

/// Below this per-file budget a truncated excerpt is mostly marker, so the
/// file is referenced by path instead.
const MIN_FILE_TOKENS: usize = 50;

/// Characters reserved for the omission marker inside a truncated file.
const MARKER_RESERVE_CHARS: usize = 40;

/// A project file as handed to the prompt builder: full content plus size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    pub size: usize,
}

/// A file selected for inlining into the prompt, possibly truncated.
///
/// When `truncated` is set the content is a prefix/suffix excerpt and must
/// not be treated as ground truth for exact line numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
    pub size: usize,
    pub truncated: bool,
}

/// Per-invocation conversation context, reconstructed from the request.
///
/// Turn 1 never carries existing-file context; turn > 1 always does, even
/// if the lists are empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_turn: u32,
    pub existing_files: Vec<String>,
    pub file_contents: Vec<ContextFile>,
    pub previous_error: Option<String>,
}

impl ConversationContext {
    /// Context for the first message of a fresh project.
    pub fn first_turn() -> Self {
        Self {
            conversation_turn: 1,
            existing_files: Vec::new(),
            file_contents: Vec::new(),
            previous_error: None,
        }
    }

    /// Build context for a turn, selecting and truncating file contents to
    /// fit the prompt budget. File context is dropped on turn 1 to keep the
    /// fresh-project invariant.
    pub fn new(
        conversation_turn: u32,
        existing_files: Vec<String>,
        sources: &[SourceFile],
        previous_error: Option<String>,
    ) -> Self {
        if conversation_turn <= 1 {
            return Self {
                conversation_turn: 1,
                existing_files: Vec::new(),
                file_contents: Vec::new(),
                previous_error,
            };
        }

        Self {
            conversation_turn,
            existing_files,
            file_contents: select_context_files(sources),
            previous_error,
        }
    }

    pub fn is_fresh_project(&self) -> bool {
        self.conversation_turn == 1
    }
}

/// Estimate the token count of a text: `ceil(characters / 4)`.
///
/// This is a heuristic, not exact; budgets derived from it are soft ceilings
/// and callers keep safety margin against the real tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Fixed importance ranking for context file selection. Lower sorts first.
///
/// Package manifest, then build configs, then entry/layout files, then
/// route/page files, then API routes, then everything else.
fn file_importance(path: &str) -> u8 {
    let name = path.rsplit('/').next().unwrap_or(path);
    let lower = name.to_ascii_lowercase();
    let path_lower = path.to_ascii_lowercase();

    if lower == "package.json" {
        return 0;
    }
    if lower.starts_with("vite.config.")
        || lower.starts_with("next.config.")
        || lower.starts_with("webpack.config.")
        || lower.starts_with("tailwind.config.")
        || lower.starts_with("postcss.config.")
        || lower.starts_with("babel.config.")
        || lower == "tsconfig.json"
    {
        return 1;
    }
    if lower.starts_with("main.")
        || lower.starts_with("index.")
        || lower.starts_with("app.")
        || lower.starts_with("layout.")
        || lower.starts_with("_app.")
    {
        return 2;
    }
    if path_lower.contains("/api/") {
        return 4;
    }
    if path_lower.contains("/pages/") || path_lower.contains("/routes/") || lower.starts_with("page.")
    {
        return 3;
    }
    5
}

/// Select at most [`MAX_CONTEXT_FILES`] files by importance while the
/// per-file and aggregate token budgets hold; files that exceed their
/// budget are truncated. Remaining files are referenced by path only.
pub fn select_context_files(sources: &[SourceFile]) -> Vec<ContextFile> {
    let mut ranked: Vec<&SourceFile> = sources.iter().collect();
    ranked.sort_by_key(|f| file_importance(&f.path));

    let mut selected = Vec::new();
    let mut used_tokens = 0usize;

    for file in ranked {
        if selected.len() >= MAX_CONTEXT_FILES {
            break;
        }

        let remaining = MAX_TOTAL_FILE_TOKENS.saturating_sub(used_tokens);
        let budget = remaining.min(MAX_FILE_TOKENS);
        if budget < MIN_FILE_TOKENS {
            break;
        }

        match truncate_to_budget(&file.content, budget) {
            None => {
                used_tokens += estimate_tokens(&file.content);
                selected.push(ContextFile {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    size: file.size,
                    truncated: false,
                });
            }
            Some((excerpt, _omitted)) => {
                used_tokens += estimate_tokens(&excerpt);
                selected.push(ContextFile {
                    path: file.path.clone(),
                    content: excerpt,
                    size: file.size,
                    truncated: true,
                });
            }
        }
    }

    selected
}

/// Truncate content to a token budget, keeping a prefix and a suffix around
/// an omission marker. Returns `None` when the content already fits, else
/// the excerpt and the number of omitted tokens. The marker itself is
/// charged against the budget.
pub fn truncate_to_budget(content: &str, max_tokens: usize) -> Option<(String, usize)> {
    let total = estimate_tokens(content);
    if total <= max_tokens {
        return None;
    }

    let budget_chars = max_tokens * CHARS_PER_TOKEN;
    let keep_chars = budget_chars.saturating_sub(MARKER_RESERVE_CHARS).max(2);
    let prefix_chars = keep_chars / 2;
    let suffix_chars = keep_chars - prefix_chars;

    let prefix: String = content.chars().take(prefix_chars).collect();
    let total_chars = content.chars().count();
    let suffix: String = content
        .chars()
        .skip(total_chars.saturating_sub(suffix_chars))
        .collect();

    let omitted = total.saturating_sub(estimate_tokens(&prefix) + estimate_tokens(&suffix));
    let excerpt = format!("{}\n[...{} tokens omitted...]\n{}", prefix, omitted, suffix);

    Some((excerpt, omitted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source(path: &str, content: &str) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            content: content.to_string(),
            size: content.len(),
        }
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_ranking_prefers_manifest_then_configs() {
        let files = vec![
            source("src/components/Button.tsx", "export default Button"),
            source("package.json", "{}"),
            source("vite.config.ts", "export default {}"),
            source("src/main.tsx", "render()"),
        ];
        let selected = select_context_files(&files);
        let paths: Vec<&str> = selected.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "package.json",
                "vite.config.ts",
                "src/main.tsx",
                "src/components/Button.tsx"
            ]
        );
    }

    #[test]
    fn test_per_file_budget_enforced() {
        // 4000 chars = 1000 estimated tokens, well over the 400 token budget
        let big = "x".repeat(4000);
        let files = vec![source("src/huge.ts", &big)];
        let selected = select_context_files(&files);

        assert_eq!(selected.len(), 1);
        assert!(selected[0].truncated);
        assert!(estimate_tokens(&selected[0].content) <= MAX_FILE_TOKENS);
    }

    #[test]
    fn test_aggregate_budget_enforced() {
        // Many oversized files never exceed the aggregate budget
        let big = "y".repeat(2000);
        let files: Vec<SourceFile> = (0..12)
            .map(|i| source(&format!("src/file{}.ts", i), &big))
            .collect();
        let selected = select_context_files(&files);

        assert!(selected.len() <= MAX_CONTEXT_FILES);
        let total: usize = selected.iter().map(|f| estimate_tokens(&f.content)).sum();
        assert!(total <= MAX_TOTAL_FILE_TOKENS, "aggregate {} over budget", total);
        for file in &selected {
            assert!(estimate_tokens(&file.content) <= MAX_FILE_TOKENS);
        }
    }

    #[test]
    fn test_truncation_keeps_prefix_suffix_and_marker() {
        // Marker plus non-empty prefix and suffix of the original
        let content = format!("HEAD{}TAIL", "m".repeat(5000));
        let (excerpt, omitted) = truncate_to_budget(&content, MAX_FILE_TOKENS).unwrap();

        assert!(excerpt.contains("tokens omitted"));
        assert!(excerpt.starts_with("HEAD"));
        assert!(excerpt.trim_end().ends_with("TAIL"));
        assert!(omitted > 0);
        assert!(estimate_tokens(&excerpt) <= MAX_FILE_TOKENS);
    }

    #[test]
    fn test_truncation_noop_when_within_budget() {
        assert!(truncate_to_budget("short file", MAX_FILE_TOKENS).is_none());
    }

    #[test]
    fn test_truncation_is_char_boundary_safe() {
        let content = "é".repeat(4000);
        let (excerpt, _) = truncate_to_budget(&content, 100).unwrap();
        assert!(excerpt.contains("tokens omitted"));
    }

    #[test]
    fn test_manifest_first_within_budgets() {
        // package.json (500 bytes) plus 9 files of 2000 bytes each: at
        // most 8 files, manifest ranked first, aggregate estimate within
        // budget.
        let mut files = vec![source("package.json", &"p".repeat(500))];
        for i in 0..9 {
            files.push(source(&format!("src/page{}.tsx", i), &"z".repeat(2000)));
        }

        let ctx = ConversationContext::new(3, files.iter().map(|f| f.path.clone()).collect(), &files, None);

        assert!(ctx.file_contents.len() <= MAX_CONTEXT_FILES);
        assert_eq!(ctx.file_contents[0].path, "package.json");
        assert!(!ctx.file_contents[0].truncated);
        let total: usize = ctx
            .file_contents
            .iter()
            .map(|f| estimate_tokens(&f.content))
            .sum();
        assert!(total <= MAX_TOTAL_FILE_TOKENS);
    }

    #[test]
    fn test_turn_one_drops_file_context() {
        let files = vec![source("package.json", "{}")];
        let ctx = ConversationContext::new(1, vec!["package.json".to_string()], &files, None);
        assert!(ctx.existing_files.is_empty());
        assert!(ctx.file_contents.is_empty());
    }
}
