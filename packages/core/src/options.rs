// ABOUTME: Choice option normalization for dropdown, checkbox and radio fields
// ABOUTME: Converts bare labels into {label, value} pairs with slugged values

use regex::Regex;

use crate::types::{FieldOption, RawOption};

lazy_static::lazy_static! {
    static ref NON_ALPHANUMERIC_RUN: Regex =
        Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid");
}

/// Lowercase the input and replace every run of non-alphanumeric characters with a hyphen
///
/// Examples:
/// - "Yes" -> "yes"
/// - "Gluten Free" -> "gluten-free"
/// - "Dairy / Lactose" -> "dairy-lactose"
pub fn slugify(input: &str) -> String {
    NON_ALPHANUMERIC_RUN
        .replace_all(&input.to_lowercase(), "-")
        .into_owned()
}

/// Normalize options into `{label, value}` pairs.
///
/// Bare strings become `{label: s, value: slugify(s)}`; pairs pass through untouched, so running
/// the normalization on its own output is a no-op.
pub fn normalize_options<I, O>(raw: I) -> Vec<FieldOption>
where
    I: IntoIterator<Item = O>,
    O: Into<RawOption>,
{
    raw.into_iter()
        .map(|option| match option.into() {
            RawOption::Label(label) => FieldOption {
                value: slugify(&label),
                label,
            },
            RawOption::Pair {
                label,
                value: Some(value),
            } => FieldOption { label, value },
            RawOption::Pair { label, value: None } => FieldOption {
                value: slugify(&label),
                label,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("Yes", "yes")]
    #[case("Gluten Free", "gluten-free")]
    #[case("Dairy / Lactose", "dairy-lactose")]
    #[case("Above 5°C!", "above-5-c-")]
    #[case("already-slugged", "already-slugged")]
    fn test_slugify(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }

    #[test]
    fn test_normalize_bare_labels() {
        let normalized = normalize_options(["Yes", "No"]);
        assert_eq!(
            normalized,
            vec![
                FieldOption {
                    label: "Yes".to_string(),
                    value: "yes".to_string()
                },
                FieldOption {
                    label: "No".to_string(),
                    value: "no".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_options(["Yes", "No", "Not Applicable"]);
        let twice = normalize_options(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_pairs_pass_through_and_missing_values_are_derived() {
        let raw: Vec<RawOption> = serde_json::from_str(
            r#"[{"label": "Pass", "value": "PASS"}, {"label": "Needs Work"}, "Fail"]"#,
        )
        .unwrap();
        let normalized = normalize_options(raw);

        let values: Vec<&str> = normalized.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["PASS", "needs-work", "fail"]);
    }
}
