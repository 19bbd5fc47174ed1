// ABOUTME: Validation helpers for fields and form documents
// ABOUTME: Field invariants, duplicate id detection and over-long label truncation

use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;

use crate::constants::{ELLIPSIS, MAX_LABEL_CHARS, TRUNCATED_LABEL_CHARS};
use crate::types::{Field, FieldType, FormDocument};

lazy_static::lazy_static! {
    static ref FIRST_SENTENCE: Regex =
        Regex::new(r"[^.!?]+[.!?]").expect("sentence pattern is valid");
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldValidationError {
    #[error("Invalid field type: {0}")]
    InvalidType(String),

    #[error("Field {0} has an empty label")]
    EmptyLabel(String),

    #[error("Field {id} of type {field_type} cannot carry options")]
    OptionsOnNonChoiceType { id: String, field_type: FieldType },

    #[error("Duplicate field id: {0}")]
    DuplicateId(String),
}

/// Check a single field against the document invariants
pub fn validate_field(field: &Field) -> Result<(), FieldValidationError> {
    if field.field_type != FieldType::Group && field.label.trim().is_empty() {
        return Err(FieldValidationError::EmptyLabel(field.id.clone()));
    }

    if !field.field_type.uses_options() && !field.options.is_empty() {
        return Err(FieldValidationError::OptionsOnNonChoiceType {
            id: field.id.clone(),
            field_type: field.field_type,
        });
    }

    Ok(())
}

/// Check every field plus id uniqueness across the document
pub fn validate_document(document: &FormDocument) -> Result<(), FieldValidationError> {
    let mut seen = HashSet::with_capacity(document.fields.len());
    for field in &document.fields {
        validate_field(field)?;
        if !seen.insert(field.id.as_str()) {
            return Err(FieldValidationError::DuplicateId(field.id.clone()));
        }
    }
    Ok(())
}

/// Cut labels longer than `MAX_LABEL_CHARS` down to their first sentence, or to
/// `TRUNCATED_LABEL_CHARS` characters plus an ellipsis when no sentence ends.
///
/// Generated forms occasionally put a whole paragraph into a label; this keeps the
/// builder usable. Shorter labels are returned unchanged.
pub fn truncate_label(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_CHARS {
        return label.to_string();
    }

    if let Some(sentence) = FIRST_SENTENCE.find(label) {
        let sentence = sentence.as_str().trim();
        if !sentence.is_empty() {
            return sentence.to_string();
        }
    }

    let mut truncated: String = label.chars().take(TRUNCATED_LABEL_CHARS).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::normalize_options;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_label_rejected_except_for_groups() {
        let field = Field::new("a", FieldType::Text, "   ");
        assert_eq!(
            validate_field(&field),
            Err(FieldValidationError::EmptyLabel("a".to_string()))
        );

        let group = Field::new("g", FieldType::Group, "");
        assert!(validate_field(&group).is_ok());
    }

    #[test]
    fn test_options_on_non_choice_type_rejected() {
        let field =
            Field::new("a", FieldType::Email, "Contact").with_options(normalize_options(["x"]));
        assert!(matches!(
            validate_field(&field),
            Err(FieldValidationError::OptionsOnNonChoiceType { .. })
        ));

        let radio = Field::new("b", FieldType::Radio, "Pass?").with_options(normalize_options([
            "Yes", "No",
        ]));
        assert!(validate_field(&radio).is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut doc = FormDocument::new();
        doc.fields.push(Field::new("a", FieldType::Text, "One"));
        doc.fields.push(Field::new("a", FieldType::Text, "Two"));
        assert_eq!(
            validate_document(&doc),
            Err(FieldValidationError::DuplicateId("a".to_string()))
        );
    }

    #[test]
    fn test_short_label_untouched() {
        let label = "Is the walk-in cooler below 5°C? Check twice.";
        assert_eq!(truncate_label(label), label);
    }

    #[test]
    fn test_long_label_without_punctuation_cut_to_100_chars() {
        let label = "a".repeat(200);
        let truncated = truncate_label(&label);
        assert_eq!(truncated.chars().count(), 103);
        assert_eq!(truncated, format!("{}...", "a".repeat(100)));
    }

    #[test]
    fn test_long_label_cut_at_first_sentence() {
        let label = format!("{}.{}", "b".repeat(39), "c".repeat(160));
        assert_eq!(label.chars().count(), 200);

        let truncated = truncate_label(&label);
        assert_eq!(truncated.chars().count(), 40);
        assert!(truncated.ends_with('.'));
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let label = "é".repeat(151);
        let truncated = truncate_label(&label);
        assert_eq!(truncated.chars().count(), 103);
    }
}
