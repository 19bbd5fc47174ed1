// ABOUTME: Limits and defaults shared by the form model and the command protocol
// ABOUTME: Label truncation thresholds, id prefixes and document defaults

/// Labels longer than this (in characters) are cut down when a form is generated
pub const MAX_LABEL_CHARS: usize = 150;

/// Fallback length used when an over-long label has no sentence-ending punctuation
pub const TRUNCATED_LABEL_CHARS: usize = 100;

/// Suffix appended to labels cut at `TRUNCATED_LABEL_CHARS`
pub const ELLIPSIS: &str = "...";

/// Prefix for generated field ids
pub const FIELD_ID_PREFIX: &str = "field-";

/// Length of the random base36 suffix of generated field ids
pub const FIELD_ID_SUFFIX_LEN: usize = 9;

/// Label used by the builder when a form has no explicit submit label
pub const DEFAULT_SUBMIT_LABEL: &str = "Submit";
