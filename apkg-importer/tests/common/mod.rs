//! Shared fixtures: in-memory collaborators and a real `.apkg` builder.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde_json::json;
use zip::write::SimpleFileOptions;

use apkg_importer::{
    BoxError, CardStore, ConvertedCard, IdentityVerifier, ImportConfig, Importer, NewDeck,
    ObjectStorage,
};

pub const BASIC_MODEL_ID: i64 = 1_000;
pub const CLOZE_MODEL_ID: i64 = 2_000;
pub const TOKEN: &str = "valid-token";
pub const USER_ID: &str = "user-1";
pub const UPLOAD_BUCKET: &str = "uploads";
pub const PACKAGE_PATH: &str = "user-1/deck.apkg";

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    pub uploads: Mutex<Vec<String>>,
    pub moves: Mutex<Vec<(String, String)>>,
}

impl MemoryStorage {
    pub fn with_package(data: Vec<u8>) -> Self {
        let storage = Self::default();
        storage.put(UPLOAD_BUCKET, PACKAGE_PATH, data);
        storage
    }

    pub fn put(&self, bucket: &str, path: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), path.to_string()), data);
    }

    pub fn paths(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, path)| path.clone())
            .collect()
    }
}

impl ObjectStorage for MemoryStorage {
    fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BoxError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| format!("object {bucket}/{path} not found").into())
    }

    fn upload(&self, bucket: &str, path: &str, data: &[u8], _content_type: &str) -> Result<(), BoxError> {
        self.uploads.lock().unwrap().push(path.to_string());
        self.put(bucket, path, data.to_vec());
        Ok(())
    }

    fn move_object(&self, bucket: &str, from: &str, to: &str) -> Result<(), BoxError> {
        let mut objects = self.objects.lock().unwrap();
        let data = objects
            .remove(&(bucket.to_string(), from.to_string()))
            .ok_or_else(|| format!("object {bucket}/{from} not found"))?;
        objects.insert((bucket.to_string(), to.to_string()), data);
        self.moves.lock().unwrap().push((from.to_string(), to.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://storage.test/{bucket}/{path}")
    }
}

// ---------------------------------------------------------------------------
// Card store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub deck_owners: Mutex<HashMap<String, String>>,
    pub created_decks: Mutex<Vec<NewDeck>>,
    pub cards: Mutex<Vec<ConvertedCard>>,
    pub batches: Mutex<usize>,
    /// Zero-based index of the batch that fails
    pub fail_on_batch: Option<usize>,
}

impl MemoryStore {
    pub fn with_deck(deck_id: &str, owner: &str) -> Self {
        let store = Self::default();
        store
            .deck_owners
            .lock()
            .unwrap()
            .insert(deck_id.to_string(), owner.to_string());
        store
    }

    pub fn card_count(&self) -> usize {
        self.cards.lock().unwrap().len()
    }
}

impl CardStore for MemoryStore {
    fn deck_owner(&self, deck_id: &str) -> Result<Option<String>, BoxError> {
        Ok(self.deck_owners.lock().unwrap().get(deck_id).cloned())
    }

    fn insert_deck(&self, deck: &NewDeck) -> Result<String, BoxError> {
        let mut created = self.created_decks.lock().unwrap();
        created.push(deck.clone());
        let deck_id = format!("new-deck-{}", created.len());
        self.deck_owners
            .lock()
            .unwrap()
            .insert(deck_id.clone(), deck.owner_id.clone());
        Ok(deck_id)
    }

    fn insert_cards(&self, cards: &[ConvertedCard]) -> Result<(), BoxError> {
        let mut batches = self.batches.lock().unwrap();
        if self.fail_on_batch == Some(*batches) {
            return Err("batch insert rejected".into());
        }
        *batches += 1;
        self.cards.lock().unwrap().extend_from_slice(cards);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

pub struct StaticIdentity;

impl IdentityVerifier for StaticIdentity {
    fn verify(&self, token: &str) -> Result<Option<String>, BoxError> {
        Ok((token == TOKEN).then(|| USER_ID.to_string()))
    }
}

pub fn importer(storage: &Arc<MemoryStorage>, store: &Arc<MemoryStore>, config: ImportConfig) -> Importer {
    Importer::new(storage.clone(), store.clone(), Arc::new(StaticIdentity), config)
}

// ---------------------------------------------------------------------------
// Package builder
// ---------------------------------------------------------------------------

/// Builds a legacy-format `.apkg` with a Basic and a Cloze note type
pub struct PackageBuilder {
    notes: Vec<(i64, String, String)>,
    media: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self {
            notes: Vec::new(),
            media: Vec::new(),
        }
    }

    pub fn note(mut self, model_id: i64, fields: &[&str], tags: &str) -> Self {
        self.notes.push((model_id, fields.join("\x1f"), tags.to_string()));
        self
    }

    pub fn media(mut self, filename: &str, data: &[u8]) -> Self {
        self.media.push((filename.to_string(), data.to_vec()));
        self
    }

    fn models_json() -> String {
        json!({
            "1000": {
                "id": BASIC_MODEL_ID,
                "name": "Basic",
                "type": 0,
                "flds": [{"name": "Front", "ord": 0}, {"name": "Back", "ord": 1}],
                "tmpls": [{
                    "name": "Card 1",
                    "ord": 0,
                    "qfmt": "{{Front}}",
                    "afmt": "{{FrontSide}}<hr id=answer>{{Back}}"
                }]
            },
            "2000": {
                "id": CLOZE_MODEL_ID,
                "name": "Cloze",
                "type": 1,
                "flds": [{"name": "Text", "ord": 0}, {"name": "Back Extra", "ord": 1}],
                "tmpls": [{
                    "name": "Cloze",
                    "ord": 0,
                    "qfmt": "{{cloze:Text}}",
                    "afmt": "{{cloze:Text}}<br>{{Back Extra}}"
                }]
            }
        })
        .to_string()
    }

    fn collection(&self) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.anki2");

        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE col (id INTEGER PRIMARY KEY, models TEXT NOT NULL);
             CREATE TABLE notes (id INTEGER PRIMARY KEY, mid INTEGER NOT NULL, flds TEXT NOT NULL, tags TEXT NOT NULL);",
        )
        .unwrap();
        conn.execute("INSERT INTO col (id, models) VALUES (1, ?1)", [Self::models_json()])
            .unwrap();
        for (index, (model_id, flds, tags)) in self.notes.iter().enumerate() {
            conn.execute(
                "INSERT INTO notes (id, mid, flds, tags) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![index as i64 + 1, model_id, flds, tags],
            )
            .unwrap();
        }
        drop(conn);

        std::fs::read(&path).unwrap()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

        writer
            .start_file("collection.anki2", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&self.collection()).unwrap();

        let manifest: serde_json::Map<String, serde_json::Value> = self
            .media
            .iter()
            .enumerate()
            .map(|(index, (filename, _))| (index.to_string(), json!(filename)))
            .collect();
        writer.start_file("media", SimpleFileOptions::default()).unwrap();
        writer
            .write_all(serde_json::Value::Object(manifest).to_string().as_bytes())
            .unwrap();

        for (index, (_, data)) in self.media.iter().enumerate() {
            writer
                .start_file(index.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }
}

/// Minimal PNG header followed by filler bytes
pub fn png_bytes() -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(b"fake image body");
    data
}

/// ID3-tagged MP3 header followed by filler bytes
pub fn mp3_bytes() -> Vec<u8> {
    let mut data = vec![0x49, 0x44, 0x33, 0x04, 0x00];
    data.extend_from_slice(b"fake audio body");
    data
}
