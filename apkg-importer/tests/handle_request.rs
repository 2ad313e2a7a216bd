//! Tests for `Importer::handle`: header parsing, body parsing and the JSON
//! response contract.

mod common;

use std::sync::Arc;

use apkg_importer::ImportConfig;

use common::{importer, MemoryStorage, MemoryStore, PackageBuilder, BASIC_MODEL_ID, USER_ID};

fn setup() -> (Arc<MemoryStorage>, Arc<MemoryStore>) {
    let package = PackageBuilder::new()
        .note(BASIC_MODEL_ID, &["Capital of Italy", "Rome"], "")
        .build();
    (
        Arc::new(MemoryStorage::with_package(package)),
        Arc::new(MemoryStore::with_deck("deck-1", USER_ID)),
    )
}

const BODY: &str = r#"{"bucket": "uploads", "file_path": "user-1/deck.apkg", "deck_id": "deck-1"}"#;

#[test]
fn success_response_shape() {
    let (storage, store) = setup();
    let (status, response) = importer(&storage, &store, ImportConfig::default())
        .handle(Some("Bearer valid-token"), BODY);

    assert_eq!(status, 200);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["deck_id"], "deck-1");
    assert_eq!(json["created_new_deck"], false);
    assert_eq!(json["import_stats"]["total_notes"], 1);
    assert_eq!(json["import_stats"]["cards_created"], 1);
    assert_eq!(json["import_stats"]["notes_ignored"], 0);
    assert_eq!(json["import_stats"]["media_files_processed"], 0);
    assert!(json["import_stats"]["elapsed_ms"].is_u64());
}

#[test]
fn missing_header_is_rejected_before_the_body_is_read() {
    let (storage, store) = setup();
    let (status, response) =
        importer(&storage, &store, ImportConfig::default()).handle(None, "not even json");

    assert_eq!(status, 400);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "IMPORT_ERROR");
    assert!(json["error"].as_str().unwrap().starts_with("Authentication failed"));
    assert_eq!(store.card_count(), 0);
}

#[test]
fn malformed_body_is_a_validation_error() {
    let (storage, store) = setup();
    let (status, response) = importer(&storage, &store, ImportConfig::default())
        .handle(Some("Bearer valid-token"), r#"{"bucket": 5}"#);

    assert_eq!(status, 400);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid request"));
}

#[test]
fn failure_carries_no_stats() {
    let (storage, store) = setup();
    let body = r#"{"bucket": "uploads", "file_path": "missing.apkg", "deck_id": "deck-1"}"#;
    let (status, response) = importer(&storage, &store, ImportConfig::default())
        .handle(Some("Bearer valid-token"), body);

    assert_eq!(status, 400);
    let json = serde_json::to_value(&response).unwrap();
    assert!(json.get("import_stats").is_none());
    assert!(json["error"].as_str().unwrap().starts_with("Storage error"));
}
