// ABOUTME: System prompt assembly from conversation context
// ABOUTME: Combines role instructions, format rules, and the context block

use crate::context::ConversationContext;
use crate::templates;

/// Build the system message for a generation call.
///
/// Pure function of the context: role instructions, artifact format rules,
/// framework practices, the dependency ordering rule, the conversation
/// context block, and the mode checklist chosen by the conversation turn.
pub fn build_system_prompt(ctx: &ConversationContext) -> String {
    let mut sections = vec![
        templates::SYSTEM_ROLE.to_string(),
        templates::ARTIFACT_FORMAT_RULES.to_string(),
        templates::FRAMEWORK_RULES.to_string(),
        templates::DEPENDENCY_ORDER_RULE.to_string(),
        render_context_block(ctx),
    ];

    if ctx.is_fresh_project() {
        sections.push(templates::FRESH_PROJECT_CHECKLIST.to_string());
    } else {
        sections.push(templates::MODIFY_PROJECT_CHECKLIST.to_string());
    }

    sections.join("\n\n")
}

fn render_context_block(ctx: &ConversationContext) -> String {
    let mut block = String::new();
    block.push_str("## Project context\n\n");
    block.push_str(&format!("Conversation turn: {}\n", ctx.conversation_turn));

    if ctx.existing_files.is_empty() {
        block.push_str("Existing files: None (fresh project)\n");
    } else {
        block.push_str("Existing files:\n");
        for path in &ctx.existing_files {
            block.push_str(&format!("- {}\n", path));
        }
    }

    for file in &ctx.file_contents {
        block.push('\n');
        if file.truncated {
            block.push_str(&format!("### {} (truncated excerpt)\n", file.path));
        } else {
            block.push_str(&format!("### {}\n", file.path));
        }
        block.push_str("```\n");
        block.push_str(&file.content);
        if !file.content.ends_with('\n') {
            block.push('\n');
        }
        block.push_str("```\n");
    }

    if let Some(error) = &ctx.previous_error {
        block.push_str(&format!("\nPrevious error:\n{}\n", error));
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ConversationContext, SourceFile};

    #[test]
    fn test_fresh_project_prompt_uses_fresh_checklist() {
        let prompt = build_system_prompt(&ConversationContext::first_turn());
        assert!(prompt.contains("Fresh project checklist"));
        assert!(!prompt.contains("Modifying an existing project"));
        assert!(prompt.contains("None (fresh project)"));
    }

    #[test]
    fn test_later_turn_uses_modify_checklist() {
        let sources = vec![SourceFile {
            path: "package.json".to_string(),
            content: "{\"name\":\"demo\"}".to_string(),
            size: 15,
        }];
        let ctx = ConversationContext::new(2, vec!["package.json".to_string()], &sources, None);
        let prompt = build_system_prompt(&ctx);

        assert!(prompt.contains("Modifying an existing project"));
        assert!(prompt.contains("Conversation turn: 2"));
        assert!(prompt.contains("- package.json"));
        assert!(prompt.contains("{\"name\":\"demo\"}"));
    }

    #[test]
    fn test_later_turn_with_no_files_falls_back() {
        // A prior turn may have produced no files; that must not crash.
        let ctx = ConversationContext::new(2, Vec::new(), &[], None);
        let prompt = build_system_prompt(&ctx);
        assert!(prompt.contains("None (fresh project)"));
        assert!(prompt.contains("Modifying an existing project"));
    }

    #[test]
    fn test_full_prompt_stays_under_model_ceiling() {
        // Worst case context: maximum file budget plus a long error still
        // leaves margin under the upstream token ceiling.
        use crate::context::{estimate_tokens, MODEL_TOKEN_CEILING};

        let big = "x".repeat(4000);
        let sources: Vec<SourceFile> = (0..12)
            .map(|i| SourceFile {
                path: format!("src/file{}.ts", i),
                content: big.clone(),
                size: big.len(),
            })
            .collect();
        let paths = sources.iter().map(|f| f.path.clone()).collect();
        let ctx = ConversationContext::new(5, paths, &sources, Some("e".repeat(2000)));

        let prompt = build_system_prompt(&ctx);
        assert!(estimate_tokens(&prompt) < MODEL_TOKEN_CEILING);
    }

    #[test]
    fn test_previous_error_is_embedded() {
        let ctx = ConversationContext::new(
            3,
            Vec::new(),
            &[],
            Some("Module not found: ./App".to_string()),
        );
        let prompt = build_system_prompt(&ctx);
        assert!(prompt.contains("Previous error:\nModule not found: ./App"));
    }
}
