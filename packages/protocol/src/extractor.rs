// ABOUTME: Extracts form commands embedded in free-form assistant text
// ABOUTME: Finds keyword, tool-tag and function-call syntaxes and isolates balanced JSON payloads

use std::collections::BTreeMap;
use std::ops::Range;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::grammar::{Command, CommandKind};

// Security: bound the input before running regexes over it
/// Maximum size of a single assistant message (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

lazy_static::lazy_static! {
    /// `ADD_FIELD: {...}`
    static ref KEYWORD_PATTERN: Regex = Regex::new(
        r"\b(CREATE_FORM|ADD_FIELD|UPDATE_FIELD|REMOVE_FIELD|MOVE_FIELD|UPDATE_FORM_META|CLEAR_FORM)\s*:"
    )
    .expect("keyword pattern is valid");

    /// `<tool name="add_field">{...}</tool>`
    static ref TOOL_TAG_PATTERN: Regex =
        Regex::new(r#"<tool\s+name\s*=\s*["']([A-Za-z_]+)["']\s*>"#)
            .expect("tool tag pattern is valid");

    static ref TOOL_TAG_CLOSE: Regex =
        Regex::new(r"^\s*</tool\s*>").expect("tool close pattern is valid");

    /// `add_field({...})`, optionally opened by a code fence
    static ref FUNCTION_CALL_PATTERN: Regex = Regex::new(
        r"(?:```[A-Za-z]*\s*)?\b(create_form|add_field|update_field|remove_field|move_field|update_form_meta|clear_form)\s*\("
    )
    .expect("function call pattern is valid");

    static ref FUNCTION_CALL_CLOSE: Regex =
        Regex::new(r"^\s*\)(?:\s*;)?(?:\s*```)?").expect("function close pattern is valid");

    /// Code fence wrapped around a keyword payload, e.g. "```json"
    static ref FENCE_OPEN: Regex = Regex::new(r"^\s*```[A-Za-z]*[ \t]*\r?\n?").expect("fence pattern is valid");

    static ref FENCE_CLOSE: Regex = Regex::new(r"^\s*```").expect("fence close pattern is valid");

    static ref BLANK_LINE_RUN: Regex = Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank line pattern is valid");
}

/// Surface syntax a command was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSyntax {
    Keyword,
    ToolTag,
    FunctionCall,
}

/// A command found in the text, with the byte range it occupied
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCommand {
    pub command: Command,
    pub syntax: CommandSyntax,
    pub span: Range<usize>,
}

/// Everything found in one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Commands in textual order
    pub commands: Vec<ExtractedCommand>,
    pub diagnostics: Vec<ProtocolError>,
    /// The text with every command occurrence removed
    pub prose: String,
}

impl Extraction {
    pub fn has_commands(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn has_parse_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_parse())
    }

    /// True when command syntax was present in the text, whether or not it parsed
    pub fn attempted_commands(&self) -> bool {
        self.has_commands() || !self.diagnostics.is_empty()
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().map(|c| &c.command)
    }
}

/// A command opening located by one of the patterns, before its payload is read
struct Opening {
    start: usize,
    header_end: usize,
    syntax: CommandSyntax,
    kind: Result<CommandKind, String>,
}

/// Extract all commands from a complete message.
///
/// Supports:
/// - `ADD_FIELD: {"type": "text", "label": "Name"}` (compact or pretty-printed JSON,
///   optionally inside a code fence)
/// - `<tool name="add_field">{...}</tool>`
/// - `add_field({...})` and `` ```add_field({...})``` ``
///
/// Never fails: malformed payloads become diagnostics and extraction continues.
pub fn extract_commands(text: &str) -> Extraction {
    // Security: validate input size before regex processing
    if text.len() > MAX_MESSAGE_SIZE {
        warn!(
            "Skipping command extraction: message of {} bytes exceeds {} bytes",
            text.len(),
            MAX_MESSAGE_SIZE
        );
        return Extraction {
            commands: Vec::new(),
            diagnostics: vec![ProtocolError::InputTooLarge {
                size: text.len(),
                limit: MAX_MESSAGE_SIZE,
            }],
            prose: text.to_string(),
        };
    }

    let mut extraction = Extraction::default();
    let mut removed: Vec<Range<usize>> = Vec::new();
    let mut consumed_until = 0;

    let openings = find_openings(text);
    for (index, opening) in openings.iter().enumerate() {
        // Openings inside an earlier payload (e.g. a keyword quoted in a description)
        if opening.start < consumed_until {
            continue;
        }

        let kind = match &opening.kind {
            Ok(kind) => *kind,
            Err(name) => {
                let end = skip_payload(text, opening.header_end, opening.syntax);
                warn!("Unknown tool name '{}' in assistant message", name);
                extraction.diagnostics.push(ProtocolError::Schema {
                    command: None,
                    message: format!("unknown command '{}'", name),
                });
                removed.push(opening.start..end);
                consumed_until = end;
                continue;
            }
        };

        // A keyword named in prose ("use ADD_FIELD: to add one") is not an attempt
        if opening.syntax == CommandSyntax::Keyword
            && kind != CommandKind::ClearForm
            && !payload_follows(text, opening.header_end)
        {
            debug!("Ignoring {} mention without a payload at {}", kind, opening.start);
            removed.push(opening.start..opening.header_end);
            consumed_until = opening.header_end;
            continue;
        }

        let next_opening = openings[index + 1..]
            .iter()
            .map(|o| o.start)
            .find(|&start| start > opening.header_end);

        let (payload, end) = match read_payload(
            text,
            opening.header_end,
            opening.syntax,
            kind,
            next_opening,
        ) {
            Ok(found) => found,
            Err((error, end)) => {
                warn!("Failed to read {} payload: {}", kind, error);
                extraction.diagnostics.push(error);
                removed.push(opening.start..end);
                consumed_until = end;
                continue;
            }
        };

        match Command::from_payload(kind, payload) {
            Ok(command) => {
                debug!(
                    "Extracted {} ({:?}) at {}..{}",
                    kind, opening.syntax, opening.start, end
                );
                extraction.commands.push(ExtractedCommand {
                    command,
                    syntax: opening.syntax,
                    span: opening.start..end,
                });
            }
            Err(error) => {
                warn!("Rejected {} payload: {}", kind, error);
                extraction.diagnostics.push(error);
            }
        }
        removed.push(opening.start..end);
        consumed_until = end;
    }

    extraction.prose = strip_spans(text, &removed);
    extraction
}

/// Count command openings per kind without parsing payloads.
///
/// Safe to call on partial, still-streaming text.
pub fn scan_keywords(text: &str) -> BTreeMap<CommandKind, usize> {
    let mut counts = BTreeMap::new();
    if text.len() > MAX_MESSAGE_SIZE {
        return counts;
    }
    for opening in find_openings(text) {
        if let Ok(kind) = opening.kind {
            *counts.entry(kind).or_insert(0) += 1;
        }
    }
    counts
}

/// Byte offset of the earliest command opening, if any
pub fn first_command_offset(text: &str) -> Option<usize> {
    find_openings(text).first().map(|o| o.start)
}

fn find_openings(text: &str) -> Vec<Opening> {
    let mut openings = Vec::new();

    for captures in KEYWORD_PATTERN.captures_iter(text) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        openings.push(Opening {
            start: whole.start(),
            header_end: whole.end(),
            syntax: CommandSyntax::Keyword,
            kind: CommandKind::from_keyword(name.as_str())
                .ok_or_else(|| name.as_str().to_string()),
        });
    }

    for captures in TOOL_TAG_PATTERN.captures_iter(text) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        openings.push(Opening {
            start: whole.start(),
            header_end: whole.end(),
            syntax: CommandSyntax::ToolTag,
            kind: CommandKind::from_tool_name(name.as_str())
                .ok_or_else(|| name.as_str().to_string()),
        });
    }

    for captures in FUNCTION_CALL_PATTERN.captures_iter(text) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        openings.push(Opening {
            start: whole.start(),
            header_end: whole.end(),
            syntax: CommandSyntax::FunctionCall,
            kind: CommandKind::from_tool_name(name.as_str())
                .ok_or_else(|| name.as_str().to_string()),
        });
    }

    openings.sort_by_key(|o| o.start);
    openings
}

/// Read the JSON object following a command header.
///
/// Returns the parsed payload (None for a bare CLEAR_FORM) and the end of the whole
/// command occurrence, or a diagnostic and the end of the text consumed. An object that
/// never closes consumes text only up to `next_opening`, so later commands still parse.
#[allow(clippy::type_complexity)]
fn read_payload(
    text: &str,
    header_end: usize,
    syntax: CommandSyntax,
    kind: CommandKind,
    next_opening: Option<usize>,
) -> Result<(Option<Value>, usize), (ProtocolError, usize)> {
    let mut cursor = header_end;
    let mut fenced = false;

    if syntax == CommandSyntax::Keyword {
        if let Some(fence) = FENCE_OPEN.find(&text[cursor..]) {
            cursor += fence.end();
            fenced = true;
        }
    }

    let object_start = cursor + leading_whitespace(&text[cursor..]);

    if !text[object_start..].starts_with('{') {
        let end = close_syntax(text, cursor, syntax, fenced);
        if kind == CommandKind::ClearForm {
            return Ok((None, end));
        }
        return Err((
            ProtocolError::Parse {
                command: kind,
                message: "no JSON object follows the command".to_string(),
            },
            end,
        ));
    }

    let Some(object_end) = find_json_object_end(text, object_start) else {
        return Err((
            ProtocolError::Parse {
                command: kind,
                message: "payload is incomplete (unbalanced braces)".to_string(),
            },
            next_opening.unwrap_or(text.len()),
        ));
    };

    let end = close_syntax(text, object_end, syntax, fenced);
    match serde_json::from_str::<Value>(&text[object_start..object_end]) {
        Ok(value) => Ok((Some(value), end)),
        Err(e) => Err((
            ProtocolError::Parse {
                command: kind,
                message: e.to_string(),
            },
            end,
        )),
    }
}

/// True when a JSON object (optionally fenced) follows a keyword header
fn payload_follows(text: &str, header_end: usize) -> bool {
    let mut cursor = header_end;
    if let Some(fence) = FENCE_OPEN.find(&text[cursor..]) {
        cursor += fence.end();
    }
    text[cursor..].trim_start().starts_with('{')
}

/// Skip over whatever payload follows an unrecognized opening
fn skip_payload(text: &str, header_end: usize, syntax: CommandSyntax) -> usize {
    let object_start = header_end + leading_whitespace(&text[header_end..]);
    if text[object_start..].starts_with('{') {
        if let Some(object_end) = find_json_object_end(text, object_start) {
            return close_syntax(text, object_end, syntax, false);
        }
    }
    close_syntax(text, header_end, syntax, false)
}

/// Consume the closing part of a syntax (`</tool>`, `)`, code fence) after `pos`
fn close_syntax(text: &str, pos: usize, syntax: CommandSyntax, fenced: bool) -> usize {
    let rest = &text[pos..];
    let closer = match syntax {
        CommandSyntax::ToolTag => TOOL_TAG_CLOSE.find(rest),
        CommandSyntax::FunctionCall => FUNCTION_CALL_CLOSE.find(rest),
        CommandSyntax::Keyword if fenced => FENCE_CLOSE.find(rest),
        CommandSyntax::Keyword => None,
    };
    pos + closer.map_or(0, |m| m.end())
}

fn leading_whitespace(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Find the end (exclusive) of the JSON object starting at `start`.
///
/// Tracks string literals and escapes so braces inside strings do not count. Nesting
/// depth is unbounded. Returns None when the object never closes, which is the normal
/// state of a payload that is still streaming.
pub fn find_json_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Remove the given byte ranges and tidy the whitespace they leave behind
fn strip_spans(text: &str, spans: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            out.push_str(&text[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    if cursor < text.len() {
        out.push_str(&text[cursor..]);
    }

    BLANK_LINE_RUN
        .replace_all(&out, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_json_object_end_handles_nesting_and_strings() {
        let text = r#"{"a": {"b": {"c": 1}}, "s": "}{"} tail"#;
        let end = find_json_object_end(text, 0).unwrap();
        assert_eq!(&text[end..], " tail");
    }

    #[test]
    fn test_find_json_object_end_handles_escaped_quotes() {
        let text = r#"{"label": "say \"hi\" }"}"#;
        assert_eq!(find_json_object_end(text, 0), Some(text.len()));
    }

    #[test]
    fn test_find_json_object_end_incomplete() {
        assert_eq!(find_json_object_end(r#"{"id": "f1", "position": {"after": "x""#, 0), None);
    }

    #[test]
    fn test_scan_keywords_counts_each_kind() {
        let text = "ADD_FIELD: {} and ADD_FIELD: {\n<tool name=\"remove_field\">{}</tool> move_field({";
        let counts = scan_keywords(text);
        assert_eq!(counts.get(&CommandKind::AddField), Some(&2));
        assert_eq!(counts.get(&CommandKind::RemoveField), Some(&1));
        assert_eq!(counts.get(&CommandKind::MoveField), Some(&1));
        assert_eq!(counts.get(&CommandKind::ClearForm), None);
    }

    #[test]
    fn test_keyword_inside_identifier_is_ignored() {
        assert!(scan_keywords("MY_ADD_FIELD: {}").is_empty());
    }

    #[test]
    fn test_first_command_offset() {
        assert_eq!(first_command_offset("Sure. ADD_FIELD: {"), Some(6));
        assert_eq!(first_command_offset("No commands here."), None);
    }

    #[test]
    fn test_prose_collapses_blank_lines() {
        let text = "Here you go.\n\nADD_FIELD: {\"type\":\"text\",\"label\":\"Name\"}\n\n\nAnything else?";
        let extraction = extract_commands(text);
        assert_eq!(extraction.prose, "Here you go.\n\nAnything else?");
    }

    #[test]
    fn test_input_too_large() {
        let text = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let extraction = extract_commands(&text);
        assert!(extraction.commands.is_empty());
        assert!(matches!(
            extraction.diagnostics.as_slice(),
            [ProtocolError::InputTooLarge { .. }]
        ));
    }
}
