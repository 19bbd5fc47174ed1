// ABOUTME: Incremental display projection of a streaming assistant reply
// ABOUTME: Hides command syntax and never lets the shown text shrink

use formpilot_protocol::{first_command_offset, CommandKind};
use regex::Regex;

lazy_static::lazy_static! {
    /// A bare keyword is cut even before its colon arrives
    static ref BARE_KEYWORD: Regex = Regex::new(
        r"\b(?:CREATE_FORM|ADD_FIELD|UPDATE_FIELD|REMOVE_FIELD|MOVE_FIELD|UPDATE_FORM_META|CLEAR_FORM)\b"
    )
    .expect("bare keyword pattern is valid");

    /// A tool tag whose `>` has not arrived yet
    static ref OPEN_TOOL_TAG: Regex =
        Regex::new(r"<tool(?:\s[^<>]*)?$").expect("open tool tag pattern is valid");

    /// A tool name still waiting for its `(`
    static ref PENDING_CALL: Regex = Regex::new(
        r"\b(?:create_form|add_field|update_field|remove_field|move_field|update_form_meta|clear_form)\s*$"
    )
    .expect("pending call pattern is valid");

    /// Opening fence left dangling once the command after it is cut
    static ref TRAILING_FENCE: Regex =
        Regex::new(r"```[A-Za-z_]*\s*$").expect("trailing fence pattern is valid");

    /// Strings whose unfinished prefix must not flash in the panel
    static ref MARKERS: Vec<String> = {
        let mut markers: Vec<String> = Vec::new();
        for kind in CommandKind::ALL {
            markers.push(format!("{}:", kind.keyword()));
            markers.push(format!("{}(", kind.tool_name()));
        }
        markers.push("<tool".to_string());
        markers.push("```".to_string());
        markers
    };
}

/// Compute the display candidate for the raw text received so far.
///
/// When `streaming` is true a trailing fragment that could grow into a
/// command opening is held back until the next chunk decides it.
pub fn project_display(raw: &str, streaming: bool) -> String {
    let mut cut = raw.len();
    if let Some(offset) = first_command_offset(raw) {
        cut = cut.min(offset);
    }
    if let Some(found) = BARE_KEYWORD.find(raw) {
        cut = cut.min(found.start());
    }

    let mut candidate = &raw[..cut];
    if let Some(tag) = OPEN_TOOL_TAG.find(candidate) {
        candidate = &candidate[..tag.start()];
    }
    if streaming {
        if let Some(call) = PENDING_CALL.find(candidate) {
            candidate = &candidate[..call.start()];
        }
        candidate = &candidate[..candidate.len() - partial_marker_len(candidate)];
    }

    let candidate = candidate.trim_end();
    let candidate = match TRAILING_FENCE.find(candidate) {
        Some(fence) => candidate[..fence.start()].trim_end(),
        None => candidate,
    };
    candidate.to_string()
}

/// Length in bytes of the longest suffix of `text` that is a proper prefix of a marker
fn partial_marker_len(text: &str) -> usize {
    let mut longest = 0;
    for marker in MARKERS.iter() {
        for (len, _) in marker.char_indices().skip(1) {
            if len > longest && text.ends_with(&marker[..len]) {
                longest = len;
            }
        }
    }
    longest
}

/// Accumulates stream chunks and keeps the display text monotonic
#[derive(Debug, Default, Clone)]
pub struct DisplayProjector {
    raw: String,
    display: String,
}

impl DisplayProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the display text after it
    pub fn push(&mut self, chunk: &str) -> &str {
        self.raw.push_str(chunk);
        let candidate = project_display(&self.raw, true);
        self.offer(candidate);
        &self.display
    }

    /// Project the final text with nothing held back
    pub fn finish(&mut self) -> &str {
        let candidate = project_display(&self.raw, false);
        self.offer(candidate);
        &self.display
    }

    /// Replace the display only with a strictly longer candidate
    pub fn offer(&mut self, candidate: String) -> bool {
        if candidate.chars().count() > self.display.chars().count() {
            self.display = candidate;
            true
        } else {
            false
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_stops_at_command() {
        assert_eq!(
            project_display("Here you go. ADD_FIELD: {\"label\": \"x\"}", true),
            "Here you go."
        );
    }

    #[test]
    fn test_partial_keyword_is_held_back() {
        assert_eq!(project_display("Sure. ADD_FI", true), "Sure.");
        assert_eq!(project_display("Sure. <to", true), "Sure.");
        assert_eq!(project_display("Sure. add_fie", true), "Sure.");
    }

    #[test]
    fn test_bare_keyword_is_cut_before_colon_arrives() {
        assert_eq!(project_display("Okay ADD_FIELD", true), "Okay");
    }

    #[test]
    fn test_dangling_fence_is_stripped() {
        assert_eq!(
            project_display("Adding it:\n```json\nADD_FIELD: {", true),
            "Adding it:"
        );
        assert_eq!(project_display("Adding it:\n``", true), "Adding it:");
    }

    #[test]
    fn test_finish_releases_held_back_text() {
        let mut projector = DisplayProjector::new();
        projector.push("Pick plan A");
        assert_eq!(projector.display(), "Pick plan");
        assert_eq!(projector.finish(), "Pick plan A");
    }

    #[test]
    fn test_display_never_shrinks() {
        let mut projector = DisplayProjector::new();
        let chunks = ["Sure, I'll", " help. ADD_FIELD:", " {\"id\""];
        let mut previous = 0;
        for chunk in chunks {
            let shown = projector.push(chunk).chars().count();
            assert!(shown >= previous);
            previous = shown;
        }
        assert_eq!(projector.display(), "Sure, I'll help.");
        assert!(!projector.display().contains("ADD_FIELD"));
    }

    #[test]
    fn test_tool_tag_split_across_chunks_is_never_shown() {
        let mut projector = DisplayProjector::new();
        let chunks = [
            "Sure. <tool",
            " name=\"add_",
            "field\">{\"type\":\"text\",\"label\":\"A\"}</tool>",
        ];
        for chunk in chunks {
            let shown = projector.push(chunk);
            assert!(!shown.contains("<tool"), "leaked: {:?}", shown);
        }
        assert_eq!(projector.finish(), "Sure.");
    }

    #[test]
    fn test_fenced_call_split_across_chunks_is_never_shown() {
        let mut projector = DisplayProjector::new();
        let chunks = [
            "Done. ```add_",
            "field",
            " ({\"type\":\"text\",\"label\":\"A\"})```",
        ];
        for chunk in chunks {
            let shown = projector.push(chunk);
            assert!(!shown.contains("add_field"), "leaked: {:?}", shown);
            assert!(!shown.contains("```"), "leaked: {:?}", shown);
        }
        assert_eq!(projector.finish(), "Done.");
    }

    #[test]
    fn test_unfinished_tool_tag_is_cut_after_stream_ends() {
        assert_eq!(project_display("Okay <tool name=\"add_fi", false), "Okay");
    }

    #[test]
    fn test_offer_rejects_shorter_candidate() {
        let mut projector = DisplayProjector::new();
        assert!(projector.offer("abcdef".to_string()));
        assert!(!projector.offer("abc".to_string()));
        assert_eq!(projector.display(), "abcdef");
    }
}
