// ABOUTME: Progress indicators and mode classification for assistant replies
// ABOUTME: Derived from the command keywords visible in the raw text

use formpilot_protocol::{scan_keywords, CommandKind};

use crate::types::MessageMode;

pub const ANALYZING: &str = "Analyzing...";

const ELLIPSIS: &str = "...";

/// Present-participle verb -> past tense
const PAST_TENSE: &[(&str, &str)] = &[
    ("Analyzing", "Analyzed"),
    ("Creating", "Created"),
    ("Adding", "Added"),
    ("Updating", "Updated"),
    ("Removing", "Removed"),
    ("Moving", "Moved"),
    ("Clearing", "Cleared"),
];

fn fields(count: usize) -> String {
    if count == 1 {
        "1 field".to_string()
    } else {
        format!("{} fields", count)
    }
}

fn indicator_for(kind: CommandKind, count: usize) -> String {
    match kind {
        CommandKind::CreateForm => "Creating form...".to_string(),
        CommandKind::AddField => format!("Adding {}...", fields(count)),
        CommandKind::UpdateField => format!("Updating {}...", fields(count)),
        CommandKind::RemoveField => format!("Removing {}...", fields(count)),
        CommandKind::MoveField => format!("Moving {}...", fields(count)),
        CommandKind::UpdateFormMeta => "Updating form details...".to_string(),
        CommandKind::ClearForm => "Clearing form...".to_string(),
    }
}

/// Indicators for a reply that may still be streaming
pub fn thinking_indicators(raw: &str) -> Vec<String> {
    let counts = scan_keywords(raw);
    if counts.is_empty() {
        return vec![ANALYZING.to_string()];
    }
    counts
        .into_iter()
        .map(|(kind, count)| indicator_for(kind, count))
        .collect()
}

/// "Adding 2 fields..." -> "Added 2 fields"
pub fn complete_indicator(indicator: &str) -> String {
    let trimmed = indicator.strip_suffix(ELLIPSIS).unwrap_or(indicator);
    let (verb, rest) = match trimmed.split_once(' ') {
        Some((verb, rest)) => (verb, Some(rest)),
        None => (trimmed, None),
    };

    let past = PAST_TENSE
        .iter()
        .find(|(present, _)| *present == verb)
        .map(|(_, past)| *past)
        .unwrap_or(verb);

    match rest {
        Some(rest) => format!("{} {}", past, rest),
        None => past.to_string(),
    }
}

pub fn complete_indicators(indicators: &[String]) -> Vec<String> {
    indicators.iter().map(|i| complete_indicator(i)).collect()
}

/// Execution when the reply carries any command, Strategy otherwise
pub fn classify_mode(raw: &str) -> MessageMode {
    if scan_keywords(raw).is_empty() {
        MessageMode::Strategy
    } else {
        MessageMode::Execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_analyzing_without_keywords() {
        assert_eq!(thinking_indicators("Let me think"), vec![ANALYZING.to_string()]);
    }

    #[test]
    fn test_indicators_follow_command_order() {
        let raw = "ADD_FIELD: {} ADD_FIELD: {} CREATE_FORM: {} CLEAR_FORM:";
        assert_eq!(
            thinking_indicators(raw),
            vec![
                "Creating form...".to_string(),
                "Adding 2 fields...".to_string(),
                "Clearing form...".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_field_is_singular() {
        assert_eq!(
            thinking_indicators("REMOVE_FIELD: {\"id\": \"a\"}"),
            vec!["Removing 1 field...".to_string()]
        );
    }

    #[rstest]
    #[case("Adding 2 fields...", "Added 2 fields")]
    #[case("Analyzing...", "Analyzed")]
    #[case("Updating form details...", "Updated form details")]
    #[case("Clearing form...", "Cleared form")]
    #[case("Thinking...", "Thinking")]
    fn test_complete_indicator(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(complete_indicator(input), expected);
    }

    #[test]
    fn test_classify_mode() {
        assert_eq!(classify_mode("Just chatting"), MessageMode::Strategy);
        assert_eq!(
            classify_mode("<tool name=\"clear_form\">{}</tool>"),
            MessageMode::Execution
        );
    }
}
