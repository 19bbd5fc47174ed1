// ABOUTME: Core form model for FormPilot
// ABOUTME: Field and document types, option normalization, styles, validation and id generation

pub mod constants;
pub mod options;
pub mod style;
pub mod types;
pub mod utils;
pub mod validation;

// Re-export main types
pub use types::{Field, FieldOption, FieldType, FormDocument, FormMeta, RawOption};

// Re-export helpers
pub use options::{normalize_options, slugify};
pub use style::{apply_default_style, restyle, style_for, FieldStyle};
pub use utils::generate_field_id;
pub use validation::{
    truncate_label, validate_document, validate_field, FieldValidationError,
};
