// ABOUTME: Cosmetic widget metadata per field type
// ABOUTME: Single lookup table used wherever a field is constructed

use serde::Serialize;

use crate::types::{Field, FieldType};

/// Color and icon the builder palette shows for a field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldStyle {
    pub color: &'static str,
    pub icon: &'static str,
}

pub fn style_for(field_type: FieldType) -> FieldStyle {
    let (color, icon) = match field_type {
        FieldType::Text => ("#3B82F6", "type"),
        FieldType::Textarea => ("#6366F1", "align-left"),
        FieldType::Email => ("#0EA5E9", "mail"),
        FieldType::Phone => ("#14B8A6", "phone"),
        FieldType::Number => ("#8B5CF6", "hash"),
        FieldType::Dropdown => ("#F59E0B", "chevron-down"),
        FieldType::Checkbox => ("#10B981", "check-square"),
        FieldType::Radio => ("#EC4899", "circle-dot"),
        FieldType::Thumbs => ("#F97316", "thumbs-up"),
        FieldType::Date => ("#EF4444", "calendar"),
        FieldType::File => ("#64748B", "paperclip"),
        FieldType::Image => ("#84CC16", "image"),
        FieldType::Group => ("#6B7280", "layout"),
    };
    FieldStyle { color, icon }
}

/// Fill in color and icon from the type table when they are missing
pub fn apply_default_style(field: &mut Field) {
    let style = style_for(field.field_type);
    if field.color.is_none() {
        field.color = Some(style.color.to_string());
    }
    if field.icon.is_none() {
        field.icon = Some(style.icon.to_string());
    }
}

/// Replace color and icon with the table entry, used after a type change
pub fn restyle(field: &mut Field) {
    field.color = None;
    field.icon = None;
    apply_default_style(field);
}
