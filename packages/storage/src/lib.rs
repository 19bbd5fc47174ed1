// ABOUTME: FormPilot persistence layer
// ABOUTME: SQLite storage of form documents and assistant conversations

pub mod forms;

pub use forms::{generate_form_id, FormStorage, FormSummary, Result, StorageError};
