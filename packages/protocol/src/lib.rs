// ABOUTME: Form command protocol for FormPilot
// ABOUTME: Grammar, extraction from assistant text, and deterministic application to form documents

pub mod applier;
pub mod error;
pub mod extractor;
pub mod grammar;

pub use applier::{
    resolve_insert_index, ApplyOutcome, ApplyPolicy, ApplyReport, FormApplier, IdGenerator,
    SequentialIdGenerator, TimestampIdGenerator,
};
pub use error::{DiagnosticKind, ProtocolError, ProtocolResult};
pub use extractor::{
    extract_commands, find_json_object_end, first_command_offset, scan_keywords, CommandSyntax,
    ExtractedCommand, Extraction, MAX_MESSAGE_SIZE,
};
pub use grammar::{
    AddFieldPayload, Command, CommandKind, CreateFormPayload, FieldPatch, FieldSpec,
    FormMetaPayload, MoveFieldPayload, Position, UpdateFieldPayload,
};
