// ABOUTME: Integration tests for form and conversation persistence
// ABOUTME: Round-trips sessions through SQLite and checks resumed sessions never reapply

use formpilot_chat::{AssistantSession, CancelFlag, MessageStatus};
use formpilot_core::FormDocument;
use formpilot_storage::{FormStorage, StorageError};
use futures::stream;
use pretty_assertions::assert_eq;
use sqlx::sqlite::SqlitePoolOptions;

async fn setup_storage() -> FormStorage {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    let storage = FormStorage::new(pool);
    storage.migrate().await.expect("Failed to run migrations");
    storage
}

async fn session_after_one_turn() -> AssistantSession {
    let mut session = AssistantSession::new(FormDocument::with_title("RSVP"));
    let reply = stream::iter(vec![Ok::<String, String>(
        "Added. ADD_FIELD: {\"type\": \"radio\", \"label\": \"Attending?\", \"options\": [\"Yes\", \"No\"]}"
            .to_string(),
    )]);
    session
        .run_turn("ask if they attend", reply, &CancelFlag::new())
        .await
        .unwrap()
        .unwrap();
    session
}

#[tokio::test]
async fn test_conversation_round_trip() {
    let storage = setup_storage().await;
    let session = session_after_one_turn().await;

    storage
        .save_conversation("form_rsvp", session.form(), session.messages())
        .await
        .unwrap();

    assert_eq!(storage.load_form("form_rsvp").await.unwrap(), *session.form());
    assert_eq!(
        storage.load_messages("form_rsvp").await.unwrap(),
        session.messages().to_vec()
    );
}

#[tokio::test]
async fn test_restored_session_does_not_reapply() {
    let storage = setup_storage().await;
    let session = session_after_one_turn().await;
    storage
        .save_conversation("form_rsvp", session.form(), session.messages())
        .await
        .unwrap();

    let form = storage.load_form("form_rsvp").await.unwrap();
    let messages = storage.load_messages("form_rsvp").await.unwrap();
    assert_eq!(messages[1].status, MessageStatus::Applied);

    let mut resumed = AssistantSession::restore(form.clone(), messages);
    assert_eq!(resumed.apply_message(1), Ok(None));
    assert_eq!(*resumed.form(), form);
    assert_eq!(resumed.form().fields.len(), 1);
}

#[tokio::test]
async fn test_list_and_delete_forms() {
    let storage = setup_storage().await;
    storage
        .save_form("form_a", &FormDocument::with_title("A"))
        .await
        .unwrap();
    let session = session_after_one_turn().await;
    storage
        .save_conversation("form_b", session.form(), session.messages())
        .await
        .unwrap();

    let forms = storage.list_forms().await.unwrap();
    assert_eq!(forms.len(), 2);
    let b = forms.iter().find(|f| f.id == "form_b").unwrap();
    assert_eq!(b.title.as_deref(), Some("RSVP"));
    assert_eq!(b.field_count, 1);

    storage.delete_form("form_b").await.unwrap();
    assert!(storage.load_messages("form_b").await.unwrap().is_empty());
    assert!(matches!(
        storage.delete_form("form_b").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_saving_messages_requires_form() {
    let storage = setup_storage().await;
    let session = session_after_one_turn().await;
    assert!(matches!(
        storage.save_messages("ghost", session.messages()).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_connect_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("forms.db").display());

    let storage = FormStorage::connect(&url).await.unwrap();
    storage
        .save_form("form_x", &FormDocument::with_title("X"))
        .await
        .unwrap();

    let reopened = FormStorage::connect(&url).await.unwrap();
    assert_eq!(
        reopened.load_form("form_x").await.unwrap(),
        FormDocument::with_title("X")
    );
}
