// ABOUTME: Tag scanner for the boltAction grammar emitted by the generation model
// ABOUTME: Tolerant of malformed tags - one bad tag never aborts the whole response

use serde::{Deserialize, Serialize};
use tracing::debug;

const ACTION_OPEN: &str = "<boltAction";
const ACTION_CLOSE: &str = "</boltAction>";
const ARTIFACT_OPEN: &str = "<boltArtifact";

/// One action extracted from generated text, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedAction {
    File { path: String, content: String },
    Shell { command: String },
}

impl ParsedAction {
    /// Short human-readable label used in logs and error accumulators.
    pub fn describe(&self) -> String {
        match self {
            ParsedAction::File { path, .. } => format!("file:{}", path),
            ParsedAction::Shell { command } => format!("shell:{}", command),
        }
    }
}

/// Parsed envelope metadata plus the ordered action list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArtifact {
    pub id: Option<String>,
    pub title: Option<String>,
    pub actions: Vec<ParsedAction>,
}

/// Scanner states: outside any tag, or inside an action body. The scanner
/// walks the document once, left to right, so action order is preserved.
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

/// A raw action before validation: the header attributes and the body text.
struct RawAction<'a> {
    header: &'a str,
    body: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Advance to the next complete `<boltAction ...>...</boltAction>` pair.
    ///
    /// An open tag without a terminated header ends the scan (nothing after
    /// it can be delimited); an open tag without a matching close tag is
    /// skipped so later well-formed tags still parse.
    fn next_raw(&mut self) -> Option<RawAction<'a>> {
        loop {
            let rel = self.input[self.pos..].find(ACTION_OPEN)?;
            let open = self.pos + rel;
            let header_start = open + ACTION_OPEN.len();

            // Reject lookalike tag names such as <boltActionX
            match self.input[header_start..].chars().next() {
                Some(c) if c.is_whitespace() || c == '>' => {}
                _ => {
                    self.pos = header_start;
                    continue;
                }
            }

            let Some(gt_rel) = self.input[header_start..].find('>') else {
                debug!("Unterminated boltAction header, ending scan");
                self.pos = self.input.len();
                return None;
            };
            let header_end = header_start + gt_rel;
            let body_start = header_end + 1;

            let Some(close_rel) = self.input[body_start..].find(ACTION_CLOSE) else {
                debug!("boltAction without closing tag, skipping");
                self.pos = body_start;
                continue;
            };
            let body_end = body_start + close_rel;
            self.pos = body_end + ACTION_CLOSE.len();

            return Some(RawAction {
                header: &self.input[header_start..header_end],
                body: &self.input[body_start..body_end],
            });
        }
    }
}

/// Extract a quoted attribute value from a tag header.
fn attribute(header: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(rel) = header[search..].find(name) {
        let at = search + rel;
        let preceded_ok = at == 0 || header[..at].ends_with(|c: char| c.is_whitespace());
        search = at + name.len();

        if !preceded_ok {
            continue;
        }

        let rest = header[at + name.len()..].trim_start();
        let Some(after_eq) = rest.strip_prefix('=') else {
            continue;
        };
        let Some(quoted) = after_eq.trim_start().strip_prefix('"') else {
            continue;
        };
        let end = quoted.find('"')?;
        return Some(quoted[..end].to_string());
    }
    None
}

/// Validate a raw action into a [`ParsedAction`], or `None` when the tag is
/// attribute-incomplete or empty. Skipping here is intentional
/// permissiveness: the generation model is not always well-formed.
fn validate(raw: &RawAction<'_>) -> Option<ParsedAction> {
    let action_type = attribute(raw.header, "type")?;
    let body = raw.body.trim();

    match action_type.as_str() {
        "file" => {
            let path = attribute(raw.header, "filePath")?;
            let path = path.trim().to_string();
            if path.is_empty() || body.is_empty() {
                debug!("Skipping file action with empty path or content");
                return None;
            }
            Some(ParsedAction::File {
                path,
                content: body.to_string(),
            })
        }
        "shell" => {
            if body.is_empty() {
                debug!("Skipping shell action with empty command");
                return None;
            }
            Some(ParsedAction::Shell {
                command: body.to_string(),
            })
        }
        other => {
            debug!("Skipping boltAction with unknown type {:?}", other);
            None
        }
    }
}

/// Extract all well-formed actions from generated text, in document order.
/// Prose outside the tags is ignored; malformed tags are skipped without
/// affecting their neighbors. An empty result is valid here - the
/// orchestrator decides whether that is fatal.
pub fn parse_actions(input: &str) -> Vec<ParsedAction> {
    let mut scanner = Scanner::new(input);
    let mut actions = Vec::new();

    while let Some(raw) = scanner.next_raw() {
        if let Some(action) = validate(&raw) {
            actions.push(action);
        }
    }

    actions
}

/// Parse the artifact envelope metadata along with the actions. The
/// envelope is ignored for action extraction; its attributes are surfaced
/// for labeling only.
pub fn parse_artifact(input: &str) -> ParsedArtifact {
    let mut id = None;
    let mut title = None;

    if let Some(open) = input.find(ARTIFACT_OPEN) {
        let header_start = open + ARTIFACT_OPEN.len();
        if let Some(gt_rel) = input[header_start..].find('>') {
            let header = &input[header_start..header_start + gt_rel];
            id = attribute(header, "id");
            title = attribute(header, "title");
        }
    }

    ParsedArtifact {
        id,
        title,
        actions: parse_actions(input),
    }
}
