//! apkg-importer - imports Anki .apkg packages into a flashcard store
//!
//! The pipeline:
//! - zip archive extraction (legacy, modern and zstd-compressed collections)
//! - SQLite database reading for notes and note types
//! - template-driven or heuristic mapping of note fields to card sides
//! - upload of referenced media only, with Markdown links in card text
//! - bounded batch persistence
//!
//! Storage, the card database and token verification are reached through the
//! traits in [`collaborators`].

pub mod archive;
pub mod cloze;
pub mod collaborators;
pub mod config;
pub mod convert;
pub mod database;
pub mod error;
pub mod heuristic;
pub mod html;
pub mod importer;
pub mod media;
pub mod models;
pub mod persist;
mod protobuf;
pub mod request;
pub mod script;
pub mod template;

// Re-export main types
pub use collaborators::{CardStore, IdentityVerifier, ObjectStorage};
pub use config::ImportConfig;
pub use error::{BoxError, ImportError};
pub use importer::Importer;
pub use models::{ConvertedCard, ImportProgress, ImportStats, NewDeck, ProgressCallback};
pub use request::{ImportOutcome, ImportRequest, ImportResponse};
pub use script::{ExtendedScripts, ScriptPredicate};
