// ABOUTME: Form document and field type definitions
// ABOUTME: Field types, options, and the ordered document edited by the builder and the assistant

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::FieldValidationError;

/// Input widget type of a form field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Phone,
    Number,
    Dropdown,
    Checkbox,
    Radio,
    Thumbs,
    Date,
    File,
    Image,
    Group,
}

impl FieldType {
    pub const ALL: [FieldType; 13] = [
        FieldType::Text,
        FieldType::Textarea,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Number,
        FieldType::Dropdown,
        FieldType::Checkbox,
        FieldType::Radio,
        FieldType::Thumbs,
        FieldType::Date,
        FieldType::File,
        FieldType::Image,
        FieldType::Group,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Number => "number",
            Self::Dropdown => "dropdown",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Thumbs => "thumbs",
            Self::Date => "date",
            Self::File => "file",
            Self::Image => "image",
            Self::Group => "group",
        }
    }

    /// Types that carry an options list
    pub fn uses_options(&self) -> bool {
        matches!(self, Self::Dropdown | Self::Checkbox | Self::Radio)
    }

    /// Types where `multiSelect` has an effect
    pub fn supports_multi_select(&self) -> bool {
        matches!(self, Self::Checkbox | Self::Dropdown)
    }

    /// Types where `dateRange` has an effect
    pub fn supports_date_range(&self) -> bool {
        matches!(self, Self::Date)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = FieldValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FieldType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| FieldValidationError::InvalidType(s.to_string()))
    }
}

/// A normalized choice option
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldOption {
    pub label: String,
    pub value: String,
}

/// An option as it arrives from the builder or from the assistant: either a bare
/// label or a `{label, value}` object. A missing `value` is derived from the label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawOption {
    Label(String),
    Pair {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl From<FieldOption> for RawOption {
    fn from(option: FieldOption) -> Self {
        RawOption::Pair {
            label: option.label,
            value: Some(option.value),
        }
    }
}

impl From<&str> for RawOption {
    fn from(label: &str) -> Self {
        RawOption::Label(label.to_string())
    }
}

fn default_required() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// A single question in a form document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_required", skip_serializing_if = "is_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_select: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Field {
    /// Creates a required field with no options and the default style of its type
    pub fn new(id: impl Into<String>, field_type: FieldType, label: impl Into<String>) -> Self {
        let style = crate::style::style_for(field_type);
        Self {
            id: id.into(),
            field_type,
            label: label.into(),
            name: None,
            placeholder: None,
            description: None,
            required: true,
            options: Vec::new(),
            multi_select: None,
            date_range: None,
            color: Some(style.color.to_string()),
            icon: Some(style.icon.to_string()),
        }
    }

    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.options = options;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Title, description and submit label of a form
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_button_label: Option<String>,
}

/// The ordered document being edited
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormDocument {
    #[serde(flatten)]
    pub meta: FormMeta,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl FormDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            meta: FormMeta {
                title: Some(title.into()),
                ..FormMeta::default()
            },
            fields: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.position_of(id).is_some()
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_ids(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.id.as_str()).collect()
    }

    /// Submit label shown by the renderer
    pub fn submit_label(&self) -> &str {
        self.meta
            .submit_button_label
            .as_deref()
            .unwrap_or(crate::constants::DEFAULT_SUBMIT_LABEL)
    }

    /// One line per field, used to give the assistant the current state of the form
    pub fn outline(&self) -> String {
        let mut lines = Vec::with_capacity(self.fields.len() + 1);
        lines.push(format!(
            "Title: {}",
            self.meta.title.as_deref().unwrap_or("(untitled)")
        ));
        for (index, field) in self.fields.iter().enumerate() {
            let mut line = format!(
                "{}. [{}] {} ({})",
                index + 1,
                field.id,
                field.label,
                field.field_type
            );
            if !field.required {
                line.push_str(" optional");
            }
            if !field.options.is_empty() {
                let labels: Vec<&str> = field.options.iter().map(|o| o.label.as_str()).collect();
                line.push_str(&format!(" options: {}", labels.join(" | ")));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}
