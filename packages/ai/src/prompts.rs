// ABOUTME: System prompt for the form-building assistant
// ABOUTME: Teaches the command grammar and embeds an outline of the current form

use formpilot_core::{FieldType, FormDocument};

const GRAMMAR: &str = r#"You can edit the form by writing commands in your reply. Write each command on its own line as KEYWORD: followed by a single JSON object. Commands run in the order you write them.

CREATE_FORM: {"title": "...", "description": "...", "fields": [{"type": "text", "label": "..."}]}
  Replaces the whole form.
ADD_FIELD: {"type": "...", "label": "...", "required": true, "options": ["..."], "position": {"after": "<field id>"}}
  position may be "top", "bottom", a 1-based index, {"after": id} or {"before": id}. Defaults to the bottom.
UPDATE_FIELD: {"id": "<field id>", "label": "...", "placeholder": "...", "required": false}
  Only the attributes you mention change.
REMOVE_FIELD: {"id": "<field id>"}
MOVE_FIELD: {"id": "<field id>", "position": "top"}
UPDATE_FORM_META: {"title": "...", "description": "...", "submitButtonLabel": "..."}
CLEAR_FORM: {}

Rules:
- Always refer to existing fields by the ids listed below.
- Options are only used by dropdown, radio and checkbox fields.
- Explain what you are doing in plain sentences before the commands. Never describe the JSON to the user.
- When the user is only asking for advice, answer without any commands."#;

/// Build the system prompt for one turn
pub fn system_prompt(form: &FormDocument) -> String {
    let types = FieldType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let current = if form.is_empty() && form.meta.title.is_none() {
        "The form is empty.".to_string()
    } else {
        form.outline()
    };

    format!(
        "You are a form-building assistant inside a visual form builder.\n\n{}\n\nField types: {}\n\nCurrent form:\n{}",
        GRAMMAR, types, current
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use formpilot_core::Field;

    #[test]
    fn test_prompt_lists_every_keyword_and_type() {
        let prompt = system_prompt(&FormDocument::new());
        for keyword in [
            "CREATE_FORM:",
            "ADD_FIELD:",
            "UPDATE_FIELD:",
            "REMOVE_FIELD:",
            "MOVE_FIELD:",
            "UPDATE_FORM_META:",
            "CLEAR_FORM:",
        ] {
            assert!(prompt.contains(keyword), "missing {}", keyword);
        }
        assert!(prompt.contains("checkbox"));
        assert!(prompt.contains("The form is empty."));
    }

    #[test]
    fn test_prompt_includes_field_ids() {
        let mut form = FormDocument::with_title("Signup");
        form.fields.push(Field::new("email-1", FieldType::Email, "Email"));
        let prompt = system_prompt(&form);
        assert!(prompt.contains("email-1"));
        assert!(!prompt.contains("The form is empty."));
    }
}
