// ABOUTME: Command grammar for assistant-driven form edits
// ABOUTME: Command kinds, payload shapes and insertion positions parsed from JSON payloads

use std::fmt;

use formpilot_core::{FieldType, RawOption};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ProtocolError, ProtocolResult};

/// The seven structural edit commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    CreateForm,
    AddField,
    UpdateField,
    RemoveField,
    MoveField,
    UpdateFormMeta,
    ClearForm,
}

impl CommandKind {
    pub const ALL: [CommandKind; 7] = [
        CommandKind::CreateForm,
        CommandKind::AddField,
        CommandKind::UpdateField,
        CommandKind::RemoveField,
        CommandKind::MoveField,
        CommandKind::UpdateFormMeta,
        CommandKind::ClearForm,
    ];

    /// Keyword used in the `KEYWORD: {...}` syntax
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::CreateForm => "CREATE_FORM",
            Self::AddField => "ADD_FIELD",
            Self::UpdateField => "UPDATE_FIELD",
            Self::RemoveField => "REMOVE_FIELD",
            Self::MoveField => "MOVE_FIELD",
            Self::UpdateFormMeta => "UPDATE_FORM_META",
            Self::ClearForm => "CLEAR_FORM",
        }
    }

    /// Name used by the legacy `<tool name="...">` and `name({...})` syntaxes
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::CreateForm => "create_form",
            Self::AddField => "add_field",
            Self::UpdateField => "update_field",
            Self::RemoveField => "remove_field",
            Self::MoveField => "move_field",
            Self::UpdateFormMeta => "update_form_meta",
            Self::ClearForm => "clear_form",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.tool_name() == name)
    }

    /// Commands that edit an existing field in place
    pub fn is_field_edit(&self) -> bool {
        matches!(self, Self::UpdateField | Self::MoveField | Self::RemoveField)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Where a field is inserted by ADD_FIELD or MOVE_FIELD
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Position {
    Top,
    #[default]
    Bottom,
    /// 1-based insert index
    Index(i64),
    After(String),
    Before(String),
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        position_from_value(&value).map_err(de::Error::custom)
    }
}

impl Serialize for Position {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Position::Top => serializer.serialize_str("top"),
            Position::Bottom => serializer.serialize_str("bottom"),
            Position::Index(n) => serializer.serialize_i64(*n),
            Position::After(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("after", id)?;
                map.end()
            }
            Position::Before(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("before", id)?;
                map.end()
            }
        }
    }
}

fn position_from_value(value: &Value) -> Result<Position, String> {
    match value {
        Value::Null => Ok(Position::Bottom),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            match s.as_str() {
                "top" | "start" | "first" | "beginning" => Ok(Position::Top),
                "bottom" | "end" | "last" | "" => Ok(Position::Bottom),
                other => match other.parse::<i64>() {
                    Ok(n) => Ok(Position::Index(n)),
                    Err(_) => {
                        warn!("Unknown position '{}', appending instead", other);
                        Ok(Position::Bottom)
                    }
                },
            }
        }
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Position::Index)
            .ok_or_else(|| format!("position {} is not an integer", n)),
        Value::Object(map) => {
            if let Some(target) = map.get("after").and_then(id_from_value) {
                Ok(Position::After(target))
            } else if let Some(target) = map.get("before").and_then(id_from_value) {
                Ok(Position::Before(target))
            } else if let Some(index) = map.get("index") {
                position_from_value(index)
            } else {
                Err("position object needs an 'after' or 'before' field id".to_string())
            }
        }
        other => Err(format!("unsupported position value: {}", other)),
    }
}

/// Field ids arrive as strings, occasionally as bare numbers
fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_field_type<'de, D>(deserializer: D) -> Result<FieldType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

fn deserialize_optional_field_type<'de, D>(deserializer: D) -> Result<Option<FieldType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| s.parse().map_err(de::Error::custom))
        .transpose()
}

/// A field description as carried by CREATE_FORM entries and ADD_FIELD payloads
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", deserialize_with = "deserialize_field_type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub options: Option<Vec<RawOption>>,
    #[serde(default)]
    pub multi_select: Option<bool>,
    #[serde(default)]
    pub date_range: Option<bool>,
}

/// Attributes an UPDATE_FIELD may change; absent attributes stay untouched
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPatch {
    #[serde(
        default,
        rename = "type",
        deserialize_with = "deserialize_optional_field_type"
    )]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub options: Option<Vec<RawOption>>,
    #[serde(default)]
    pub multi_select: Option<bool>,
    #[serde(default)]
    pub date_range: Option<bool>,
}

impl FieldPatch {
    pub fn is_empty(&self) -> bool {
        self == &FieldPatch::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateFormPayload {
    pub title: String,
    pub description: Option<String>,
    pub submit_button_label: Option<String>,
    pub fields: Vec<FieldSpec>,
    /// Reasons for entries of `fields` that could not be read
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddFieldPayload {
    pub field: FieldSpec,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFieldPayload {
    pub id: String,
    pub patch: FieldPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveFieldPayload {
    pub id: String,
    pub position: Position,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMetaPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub submit_button_label: Option<String>,
}

/// A parsed structural edit
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateForm(CreateFormPayload),
    AddField(AddFieldPayload),
    UpdateField(UpdateFieldPayload),
    RemoveField { id: String },
    MoveField(MoveFieldPayload),
    UpdateFormMeta(FormMetaPayload),
    ClearForm,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CreateForm(_) => CommandKind::CreateForm,
            Self::AddField(_) => CommandKind::AddField,
            Self::UpdateField(_) => CommandKind::UpdateField,
            Self::RemoveField { .. } => CommandKind::RemoveField,
            Self::MoveField(_) => CommandKind::MoveField,
            Self::UpdateFormMeta(_) => CommandKind::UpdateFormMeta,
            Self::ClearForm => CommandKind::ClearForm,
        }
    }

    /// Build a command from its kind and JSON payload.
    ///
    /// `payload` is `None` when the keyword was not followed by an object, which only
    /// CLEAR_FORM accepts.
    pub fn from_payload(kind: CommandKind, payload: Option<Value>) -> ProtocolResult<Command> {
        let mut map = match payload {
            Some(Value::Object(map)) => map,
            None if kind == CommandKind::ClearForm => return Ok(Command::ClearForm),
            None => return Err(ProtocolError::schema(kind, "missing JSON payload")),
            Some(other) => {
                return Err(ProtocolError::schema(
                    kind,
                    format!("payload must be a JSON object, got {}", json_type_name(&other)),
                ))
            }
        };

        match kind {
            CommandKind::CreateForm => parse_create_form(map).map(Command::CreateForm),
            CommandKind::AddField => {
                let position = match map.remove("position") {
                    Some(value) => position_from_value(&value)
                        .map_err(|e| ProtocolError::schema(kind, e))?,
                    None => Position::Bottom,
                };
                let field = parse_object::<FieldSpec>(kind, map)?;
                Ok(Command::AddField(AddFieldPayload { field, position }))
            }
            CommandKind::UpdateField => {
                let id = take_id(kind, &mut map)?;
                // Some replies nest the changes under "updates" or "changes"
                for key in ["updates", "changes"] {
                    if let Some(Value::Object(nested)) = map.remove(key) {
                        map.extend(nested);
                    }
                }
                let patch = parse_object::<FieldPatch>(kind, map)?;
                Ok(Command::UpdateField(UpdateFieldPayload { id, patch }))
            }
            CommandKind::RemoveField => Ok(Command::RemoveField {
                id: take_id(kind, &mut map)?,
            }),
            CommandKind::MoveField => {
                let id = take_id(kind, &mut map)?;
                let position = map
                    .get("position")
                    .ok_or_else(|| ProtocolError::schema(kind, "missing field `position`"))
                    .and_then(|value| {
                        position_from_value(value).map_err(|e| ProtocolError::schema(kind, e))
                    })?;
                Ok(Command::MoveField(MoveFieldPayload { id, position }))
            }
            CommandKind::UpdateFormMeta => {
                parse_object::<FormMetaPayload>(kind, map).map(Command::UpdateFormMeta)
            }
            CommandKind::ClearForm => Ok(Command::ClearForm),
        }
    }
}

fn parse_object<T: for<'de> Deserialize<'de>>(
    kind: CommandKind,
    map: Map<String, Value>,
) -> ProtocolResult<T> {
    serde_json::from_value(Value::Object(map)).map_err(|e| ProtocolError::schema(kind, e.to_string()))
}

fn take_id(kind: CommandKind, map: &mut Map<String, Value>) -> ProtocolResult<String> {
    map.remove("id")
        .as_ref()
        .and_then(id_from_value)
        .ok_or_else(|| ProtocolError::schema(kind, "missing field `id`"))
}

fn parse_create_form(mut map: Map<String, Value>) -> ProtocolResult<CreateFormPayload> {
    let kind = CommandKind::CreateForm;

    let title = match map.remove("title") {
        Some(Value::String(title)) => title,
        Some(_) => return Err(ProtocolError::schema(kind, "`title` must be a string")),
        None => return Err(ProtocolError::schema(kind, "missing field `title`")),
    };

    let entries = match map.remove("fields") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(ProtocolError::schema(kind, "`fields` must be an array")),
        None => return Err(ProtocolError::schema(kind, "missing field `fields`")),
    };

    let mut fields = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<FieldSpec>(entry) {
            Ok(spec) => fields.push(spec),
            Err(e) => rejected.push(format!("fields[{}]: {}", index, e)),
        }
    }

    let meta: FormMetaPayload = parse_object(kind, map)?;

    Ok(CreateFormPayload {
        title,
        description: meta.description,
        submit_button_label: meta.submit_button_label,
        fields,
        rejected,
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(null), Position::Bottom)]
    #[case(json!("bottom"), Position::Bottom)]
    #[case(json!("Top"), Position::Top)]
    #[case(json!(3), Position::Index(3))]
    #[case(json!("2"), Position::Index(2))]
    #[case(json!({"after": "b"}), Position::After("b".to_string()))]
    #[case(json!({"before": "c"}), Position::Before("c".to_string()))]
    #[case(json!("somewhere"), Position::Bottom)]
    fn test_position_from_value(#[case] value: Value, #[case] expected: Position) {
        assert_eq!(position_from_value(&value).unwrap(), expected);
    }

    #[test]
    fn test_position_object_without_target_is_rejected() {
        assert!(position_from_value(&json!({"near": "a"})).is_err());
    }

    #[test]
    fn test_position_serializes_back_to_grammar_shape() {
        assert_eq!(
            serde_json::to_value(Position::After("a".to_string())).unwrap(),
            json!({"after": "a"})
        );
        assert_eq!(serde_json::to_value(Position::Top).unwrap(), json!("top"));
        assert_eq!(serde_json::to_value(Position::Index(2)).unwrap(), json!(2));
    }

    #[test]
    fn test_keyword_and_tool_name_lookup() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_keyword(kind.keyword()), Some(kind));
            assert_eq!(CommandKind::from_tool_name(kind.tool_name()), Some(kind));
        }
        assert_eq!(CommandKind::from_tool_name("Add_Field"), Some(CommandKind::AddField));
        assert_eq!(CommandKind::from_keyword("DELETE_FIELD"), None);
    }

    #[test]
    fn test_add_field_payload() {
        let command = Command::from_payload(
            CommandKind::AddField,
            Some(json!({
                "type": "Dropdown",
                "label": "Delivery temperature",
                "options": ["Below 5°C", "Above 5°C"],
                "position": {"after": "f2"}
            })),
        )
        .unwrap();

        let Command::AddField(payload) = command else {
            panic!("expected ADD_FIELD");
        };
        assert_eq!(payload.field.field_type, FieldType::Dropdown);
        assert_eq!(payload.field.id, None);
        assert_eq!(payload.position, Position::After("f2".to_string()));
        assert_eq!(payload.field.options.as_ref().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_add_field_missing_label_is_schema_error() {
        let err = Command::from_payload(CommandKind::AddField, Some(json!({"type": "text"})))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Schema { command: Some(CommandKind::AddField), ref message } if message.contains("label")
        ));
    }

    #[test]
    fn test_add_field_unknown_type_is_schema_error() {
        let err = Command::from_payload(
            CommandKind::AddField,
            Some(json!({"type": "slider", "label": "Rating"})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("slider"));
    }

    #[test]
    fn test_update_field_accepts_nested_changes() {
        let command = Command::from_payload(
            CommandKind::UpdateField,
            Some(json!({"id": "f1", "updates": {"label": "New", "required": false}})),
        )
        .unwrap();

        assert_eq!(
            command,
            Command::UpdateField(UpdateFieldPayload {
                id: "f1".to_string(),
                patch: FieldPatch {
                    label: Some("New".to_string()),
                    required: Some(false),
                    ..FieldPatch::default()
                },
            })
        );
    }

    #[test]
    fn test_update_field_requires_id() {
        let err = Command::from_payload(CommandKind::UpdateField, Some(json!({"label": "x"})))
            .unwrap_err();
        assert_eq!(err, ProtocolError::schema(CommandKind::UpdateField, "missing field `id`"));
    }

    #[test]
    fn test_move_field_requires_position() {
        assert!(
            Command::from_payload(CommandKind::MoveField, Some(json!({"id": "a"}))).is_err()
        );
        assert_eq!(
            Command::from_payload(
                CommandKind::MoveField,
                Some(json!({"id": "a", "position": "top"}))
            )
            .unwrap(),
            Command::MoveField(MoveFieldPayload {
                id: "a".to_string(),
                position: Position::Top
            })
        );
    }

    #[test]
    fn test_create_form_keeps_readable_entries() {
        let command = Command::from_payload(
            CommandKind::CreateForm,
            Some(json!({
                "title": "Receiving log",
                "fields": [
                    {"type": "text", "label": "Supplier", "name": "supplier"},
                    {"label": "No type"},
                    {"type": "date", "label": "Received on"}
                ]
            })),
        )
        .unwrap();

        let Command::CreateForm(payload) = command else {
            panic!("expected CREATE_FORM");
        };
        assert_eq!(payload.title, "Receiving log");
        assert_eq!(payload.fields.len(), 2);
        assert_eq!(payload.rejected.len(), 1);
        assert!(payload.rejected[0].starts_with("fields[1]"));
    }

    #[test]
    fn test_create_form_requires_title_and_fields() {
        assert!(Command::from_payload(CommandKind::CreateForm, Some(json!({"fields": []}))).is_err());
        assert!(Command::from_payload(CommandKind::CreateForm, Some(json!({"title": "x"}))).is_err());
    }

    #[test]
    fn test_clear_form_without_payload() {
        assert_eq!(
            Command::from_payload(CommandKind::ClearForm, None).unwrap(),
            Command::ClearForm
        );
        assert_eq!(
            Command::from_payload(CommandKind::ClearForm, Some(json!({}))).unwrap(),
            Command::ClearForm
        );
        assert!(Command::from_payload(CommandKind::RemoveField, None).is_err());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let err = Command::from_payload(CommandKind::RemoveField, Some(json!(["a"]))).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }
}
