//! Services the importer talks to but does not own.
//!
//! The host application wires real bucket, database and identity clients
//! behind these traits. Implementations must be `Send + Sync` so a single
//! [`Importer`](crate::Importer) can serve concurrent requests.

use crate::error::BoxError;
use crate::models::{ConvertedCard, NewDeck};

/// Object storage (buckets of named blobs)
pub trait ObjectStorage: Send + Sync {
    fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BoxError>;

    fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), BoxError>;

    fn move_object(&self, bucket: &str, from: &str, to: &str) -> Result<(), BoxError>;

    /// URL under which a stored object can be fetched by clients
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Relational store holding decks and cards
pub trait CardStore: Send + Sync {
    /// Owner of a deck, or `None` if the deck does not exist
    fn deck_owner(&self, deck_id: &str) -> Result<Option<String>, BoxError>;

    /// Insert a deck and return its id
    fn insert_deck(&self, deck: &NewDeck) -> Result<String, BoxError>;

    /// Insert one batch of cards atomically
    fn insert_cards(&self, cards: &[ConvertedCard]) -> Result<(), BoxError>;
}

/// Resolves bearer tokens to user ids
pub trait IdentityVerifier: Send + Sync {
    /// User id for a valid token, `None` for an unknown or expired one
    fn verify(&self, token: &str) -> Result<Option<String>, BoxError>;
}
