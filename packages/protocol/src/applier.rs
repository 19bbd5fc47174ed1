// ABOUTME: Applies parsed form commands to a form document
// ABOUTME: Position resolution, shallow-merge updates, id generation and apply policies

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use formpilot_core::{
    apply_default_style, generate_field_id, normalize_options, restyle, truncate_label, Field,
    FieldType, FormDocument, FormMeta,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::grammar::{
    AddFieldPayload, Command, CommandKind, CreateFormPayload, FieldPatch, FieldSpec,
    FormMetaPayload, MoveFieldPayload, Position, UpdateFieldPayload,
};

/// Source of ids for fields created without one
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, existing: &[&str]) -> String;
}

/// `field-<millis>-<random>` ids, the production default
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIdGenerator;

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&self, existing: &[&str]) -> String {
        generate_field_id(existing.iter().copied())
    }
}

/// Deterministic `<prefix>-1`, `<prefix>-2`, ... ids
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicUsize,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicUsize::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self, existing: &[&str]) -> String {
        loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let candidate = format!("{}-{}", self.prefix, n);
            if !existing.contains(&candidate.as_str()) {
                return candidate;
            }
        }
    }
}

/// How multiple commands in one message interact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Every command applies in textual order against the previous result
    #[default]
    TextualOrder,
    /// Legacy builder behavior: when a message edits, moves or removes fields, its
    /// ADD_FIELD commands are dropped (and reported)
    EditsPreemptAdds,
}

impl ApplyPolicy {
    pub const ALL: [ApplyPolicy; 2] = [Self::TextualOrder, Self::EditsPreemptAdds];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextualOrder => "textual_order",
            Self::EditsPreemptAdds => "edits_preempt_adds",
        }
    }
}

impl FromStr for ApplyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "textual_order" | "textual" | "ordered" => Ok(Self::TextualOrder),
            "edits_preempt_adds" | "legacy" => Ok(Self::EditsPreemptAdds),
            other => Err(format!("unknown apply policy: {}", other)),
        }
    }
}

/// Result of applying one command
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub document: FormDocument,
    pub diagnostics: Vec<ProtocolError>,
    /// The command was rejected entirely and the document is unchanged
    pub skipped: bool,
    pub changed: bool,
}

impl ApplyOutcome {
    fn applied(before: &FormDocument, document: FormDocument, diagnostics: Vec<ProtocolError>) -> Self {
        let changed = &document != before;
        Self {
            document,
            diagnostics,
            skipped: false,
            changed,
        }
    }

    fn skipped(before: &FormDocument, diagnostic: ProtocolError) -> Self {
        Self {
            document: before.clone(),
            diagnostics: vec![diagnostic],
            skipped: true,
            changed: false,
        }
    }
}

/// Result of applying every command of a message
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub document: FormDocument,
    pub diagnostics: Vec<ProtocolError>,
    pub applied: usize,
    pub skipped: usize,
    pub changed: bool,
}

/// Applies commands to documents. Holds no document state; the only dependency is
/// the id source.
pub struct FormApplier {
    ids: Box<dyn IdGenerator>,
}

impl Default for FormApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl FormApplier {
    pub fn new() -> Self {
        Self {
            ids: Box::new(TimestampIdGenerator),
        }
    }

    pub fn with_id_generator(ids: impl IdGenerator + 'static) -> Self {
        Self { ids: Box::new(ids) }
    }

    /// Apply a single command, returning the next document
    pub fn apply(&self, document: &FormDocument, command: &Command) -> ApplyOutcome {
        match command {
            Command::CreateForm(payload) => self.create_form(document, payload),
            Command::AddField(payload) => self.add_field(document, payload),
            Command::UpdateField(payload) => update_field(document, payload),
            Command::RemoveField { id } => remove_field(document, id),
            Command::MoveField(payload) => move_field(document, payload),
            Command::UpdateFormMeta(payload) => update_form_meta(document, payload),
            Command::ClearForm => {
                info!("Clearing form ({} fields)", document.len());
                ApplyOutcome::applied(document, FormDocument::default(), Vec::new())
            }
        }
    }

    /// Apply commands in order, each against the result of the previous one
    pub fn apply_all<'a, I>(&self, document: &FormDocument, commands: I, policy: ApplyPolicy) -> ApplyReport
    where
        I: IntoIterator<Item = &'a Command>,
    {
        let commands: Vec<&Command> = commands.into_iter().collect();
        let preempt_adds = policy == ApplyPolicy::EditsPreemptAdds
            && commands.iter().any(|c| c.kind().is_field_edit());

        let mut report = ApplyReport {
            document: document.clone(),
            diagnostics: Vec::new(),
            applied: 0,
            skipped: 0,
            changed: false,
        };

        for command in commands {
            if preempt_adds && command.kind() == CommandKind::AddField {
                warn!("Dropping ADD_FIELD: message also edits existing fields");
                report.diagnostics.push(ProtocolError::Preempted {
                    command: CommandKind::AddField,
                    reason: "field edits in the same message take priority".to_string(),
                });
                report.skipped += 1;
                continue;
            }

            let outcome = self.apply(&report.document, command);
            report.diagnostics.extend(outcome.diagnostics);
            if outcome.skipped {
                report.skipped += 1;
            } else {
                report.applied += 1;
            }
            report.changed |= outcome.changed;
            report.document = outcome.document;
        }

        debug!(
            "Applied {} command(s), skipped {}, {} diagnostic(s)",
            report.applied,
            report.skipped,
            report.diagnostics.len()
        );
        report
    }

    fn create_form(&self, document: &FormDocument, payload: &CreateFormPayload) -> ApplyOutcome {
        let kind = CommandKind::CreateForm;
        let mut diagnostics: Vec<ProtocolError> = payload
            .rejected
            .iter()
            .map(|reason| ProtocolError::schema(kind, reason.clone()))
            .collect();

        let mut next = FormDocument {
            meta: FormMeta {
                title: non_empty(&payload.title),
                description: payload.description.as_deref().and_then(non_empty),
                submit_button_label: payload.submit_button_label.as_deref().and_then(non_empty),
            },
            fields: Vec::with_capacity(payload.fields.len()),
        };

        for spec in &payload.fields {
            let id = match spec.id.as_deref().and_then(non_empty) {
                Some(id) if !next.contains_id(&id) => id,
                _ => self.ids.next_id(&next.field_ids()),
            };
            match build_field(kind, spec, id, true) {
                Ok(field) => next.fields.push(field),
                Err(error) => diagnostics.push(error),
            }
        }

        info!(
            "Created form '{}' with {} field(s)",
            payload.title,
            next.fields.len()
        );
        ApplyOutcome::applied(document, next, diagnostics)
    }

    fn add_field(&self, document: &FormDocument, payload: &AddFieldPayload) -> ApplyOutcome {
        let kind = CommandKind::AddField;

        let id = match payload.field.id.as_deref().and_then(non_empty) {
            Some(id) if document.contains_id(&id) => {
                return ApplyOutcome::skipped(
                    document,
                    ProtocolError::Schema {
                        command: Some(kind),
                        message: format!("field id '{}' already exists", id),
                    },
                );
            }
            Some(id) => id,
            None => self.ids.next_id(&document.field_ids()),
        };

        let field = match build_field(kind, &payload.field, id, false) {
            Ok(field) => field,
            Err(error) => return ApplyOutcome::skipped(document, error),
        };

        let mut diagnostics = Vec::new();
        let (index, fallback) = resolve_insert_index(&document.fields, &payload.position, kind);
        diagnostics.extend(fallback);

        debug!("Adding field {} at index {}", field.id, index);
        let mut next = document.clone();
        next.fields.insert(index, field);
        ApplyOutcome::applied(document, next, diagnostics)
    }
}

/// Turn a field spec into a field that satisfies the document invariants
fn build_field(
    kind: CommandKind,
    spec: &FieldSpec,
    id: String,
    truncate: bool,
) -> Result<Field, ProtocolError> {
    if spec.field_type != FieldType::Group && spec.label.trim().is_empty() {
        return Err(ProtocolError::schema(kind, "field label is empty"));
    }

    let label = if truncate {
        truncate_label(&spec.label)
    } else {
        spec.label.clone()
    };

    let mut field = Field::new(id, spec.field_type, label);
    field.name = spec.name.as_deref().and_then(non_empty);
    field.placeholder = spec.placeholder.as_deref().and_then(non_empty);
    field.description = spec.description.as_deref().and_then(non_empty);
    field.required = spec.required.unwrap_or(true);
    field.multi_select = spec.multi_select;
    field.date_range = spec.date_range;

    if let Some(options) = &spec.options {
        if spec.field_type.uses_options() {
            field.options = normalize_options(options.iter().cloned());
        } else if !options.is_empty() {
            debug!(
                "Dropping {} option(s) from {} field {}",
                options.len(),
                spec.field_type,
                field.id
            );
        }
    }

    apply_default_style(&mut field);
    Ok(field)
}

/// Resolve where to insert into `fields`, with the append/prepend fallbacks for
/// missing targets
pub fn resolve_insert_index(
    fields: &[Field],
    position: &Position,
    kind: CommandKind,
) -> (usize, Option<ProtocolError>) {
    let len = fields.len();
    match position {
        Position::Top => (0, None),
        Position::Bottom => (len, None),
        Position::Index(n) => (n.saturating_sub(1).clamp(0, len as i64) as usize, None),
        Position::After(target) => match fields.iter().position(|f| &f.id == target) {
            Some(i) => (i + 1, None),
            None => (
                len,
                Some(ProtocolError::reference(kind, target.clone(), "appended at the end")),
            ),
        },
        Position::Before(target) => match fields.iter().position(|f| &f.id == target) {
            Some(i) => (i, None),
            None => (
                0,
                Some(ProtocolError::reference(kind, target.clone(), "inserted at the top")),
            ),
        },
    }
}

fn update_field(document: &FormDocument, payload: &UpdateFieldPayload) -> ApplyOutcome {
    let kind = CommandKind::UpdateField;
    let Some(index) = document.position_of(&payload.id) else {
        warn!("UPDATE_FIELD for unknown field {}", payload.id);
        return ApplyOutcome::skipped(
            document,
            ProtocolError::reference(kind, payload.id.clone(), "update ignored"),
        );
    };

    let mut next = document.clone();
    let field = &mut next.fields[index];
    if let Err(error) = merge_patch(field, &payload.patch) {
        return ApplyOutcome::skipped(document, error);
    }

    debug!("Updated field {}", payload.id);
    ApplyOutcome::applied(document, next, Vec::new())
}

/// Shallow merge: attributes absent from the patch stay as they are. Options are replaced
/// wholesale. An empty string clears an optional text attribute.
fn merge_patch(field: &mut Field, patch: &FieldPatch) -> Result<(), ProtocolError> {
    let kind = CommandKind::UpdateField;

    if let Some(field_type) = patch.field_type {
        if field_type != field.field_type {
            field.field_type = field_type;
            restyle(field);
        }
    }

    if let Some(label) = &patch.label {
        if field.field_type != FieldType::Group && label.trim().is_empty() {
            return Err(ProtocolError::schema(kind, "field label cannot be emptied"));
        }
        field.label = label.clone();
    }

    if let Some(name) = &patch.name {
        field.name = non_empty(name);
    }
    if let Some(placeholder) = &patch.placeholder {
        field.placeholder = non_empty(placeholder);
    }
    if let Some(description) = &patch.description {
        field.description = non_empty(description);
    }
    if let Some(required) = patch.required {
        field.required = required;
    }
    if let Some(multi_select) = patch.multi_select {
        field.multi_select = Some(multi_select);
    }
    if let Some(date_range) = patch.date_range {
        field.date_range = Some(date_range);
    }
    if let Some(options) = &patch.options {
        field.options = normalize_options(options.iter().cloned());
    }

    if !field.field_type.uses_options() {
        field.options.clear();
    }

    Ok(())
}

fn remove_field(document: &FormDocument, id: &str) -> ApplyOutcome {
    let Some(index) = document.position_of(id) else {
        warn!("REMOVE_FIELD for unknown field {}", id);
        return ApplyOutcome::skipped(
            document,
            ProtocolError::reference(CommandKind::RemoveField, id, "nothing removed"),
        );
    };

    let mut next = document.clone();
    next.fields.remove(index);
    debug!("Removed field {}", id);
    ApplyOutcome::applied(document, next, Vec::new())
}

fn move_field(document: &FormDocument, payload: &MoveFieldPayload) -> ApplyOutcome {
    let kind = CommandKind::MoveField;
    let Some(index) = document.position_of(&payload.id) else {
        warn!("MOVE_FIELD for unknown field {}", payload.id);
        return ApplyOutcome::skipped(
            document,
            ProtocolError::reference(kind, payload.id.clone(), "nothing moved"),
        );
    };

    let mut next = document.clone();
    let field = next.fields.remove(index);
    let (target, fallback) = resolve_insert_index(&next.fields, &payload.position, kind);
    next.fields.insert(target, field);

    debug!("Moved field {} from {} to {}", payload.id, index, target);
    ApplyOutcome::applied(document, next, fallback.into_iter().collect())
}

fn update_form_meta(document: &FormDocument, payload: &FormMetaPayload) -> ApplyOutcome {
    let mut next = document.clone();
    if let Some(title) = &payload.title {
        next.meta.title = non_empty(title);
    }
    if let Some(description) = &payload.description {
        next.meta.description = non_empty(description);
    }
    if let Some(label) = &payload.submit_button_label {
        next.meta.submit_button_label = non_empty(label);
    }
    ApplyOutcome::applied(document, next, Vec::new())
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(id: &str) -> Field {
        Field::new(id, FieldType::Text, id.to_uppercase())
    }

    fn fields(ids: &[&str]) -> Vec<Field> {
        ids.iter().map(|id| field(id)).collect()
    }

    #[test]
    fn test_resolve_index_positions() {
        let abc = fields(&["a", "b", "c"]);
        let kind = CommandKind::AddField;

        assert_eq!(resolve_insert_index(&abc, &Position::Top, kind), (0, None));
        assert_eq!(resolve_insert_index(&abc, &Position::Bottom, kind), (3, None));
        assert_eq!(resolve_insert_index(&abc, &Position::Index(1), kind), (0, None));
        assert_eq!(resolve_insert_index(&abc, &Position::Index(2), kind), (1, None));
        assert_eq!(resolve_insert_index(&abc, &Position::Index(0), kind), (0, None));
        assert_eq!(resolve_insert_index(&abc, &Position::Index(99), kind), (3, None));
        assert_eq!(
            resolve_insert_index(&abc, &Position::Before("b".to_string()), kind),
            (1, None)
        );
    }

    #[test]
    fn test_missing_before_target_prepends() {
        let abc = fields(&["a", "b", "c"]);
        let (index, diagnostic) =
            resolve_insert_index(&abc, &Position::Before("zzz".to_string()), CommandKind::MoveField);
        assert_eq!(index, 0);
        assert!(matches!(diagnostic, Some(ProtocolError::Reference { ref id, .. }) if id == "zzz"));
    }

    #[test]
    fn test_sequential_ids_skip_existing() {
        let ids = SequentialIdGenerator::new("f");
        assert_eq!(ids.next_id(&["f-1"]), "f-2");
        assert_eq!(ids.next_id(&[]), "f-3");
    }

    #[test]
    fn test_merge_patch_type_change_clears_options() {
        let mut dropdown = Field::new("d", FieldType::Dropdown, "Shift")
            .with_options(normalize_options(["AM", "PM"]));
        let patch = FieldPatch {
            field_type: Some(FieldType::Text),
            ..FieldPatch::default()
        };

        merge_patch(&mut dropdown, &patch).unwrap();

        assert_eq!(dropdown.field_type, FieldType::Text);
        assert!(dropdown.options.is_empty());
        assert_eq!(dropdown.icon.as_deref(), Some("type"));
    }

    #[test]
    fn test_merge_patch_rejects_blank_label() {
        let mut text = field("a");
        let patch = FieldPatch {
            label: Some("  ".to_string()),
            ..FieldPatch::default()
        };
        assert!(merge_patch(&mut text, &patch).is_err());
    }

    #[test]
    fn test_apply_policy_from_str() {
        assert_eq!("legacy".parse::<ApplyPolicy>().unwrap(), ApplyPolicy::EditsPreemptAdds);
        assert_eq!(
            "TEXTUAL_ORDER".parse::<ApplyPolicy>().unwrap(),
            ApplyPolicy::TextualOrder
        );
        assert!("random".parse::<ApplyPolicy>().is_err());
        for policy in ApplyPolicy::ALL {
            assert_eq!(policy.as_str().parse::<ApplyPolicy>().unwrap(), policy);
        }
    }
}
