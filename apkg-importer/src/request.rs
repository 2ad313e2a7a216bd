//! Request and response shapes exchanged with the HTTP layer.

use serde::{Deserialize, Serialize};

use crate::error::ImportError;
use crate::models::ImportStats;

/// Body of an import request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportRequest {
    /// Bucket holding the uploaded package
    pub bucket: String,
    /// Object path of the package inside `bucket`
    pub file_path: String,
    #[serde(default)]
    pub deck_id: Option<String>,
    #[serde(default)]
    pub create_new_deck: bool,
    #[serde(default)]
    pub deck_name: Option<String>,
    #[serde(default)]
    pub deck_description: Option<String>,
    #[serde(default)]
    pub deck_color: Option<String>,
}

/// Where imported cards go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckTarget {
    Existing {
        deck_id: String,
    },
    New {
        name: String,
        description: Option<String>,
        color: Option<String>,
    },
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ImportRequest {
    /// Check required fields and resolve the deck target.
    ///
    /// `create_new_deck` wins over a supplied `deck_id`.
    pub fn validate(&self) -> Result<DeckTarget, ImportError> {
        if self.bucket.trim().is_empty() {
            return Err(ImportError::Validation("bucket is required".to_string()));
        }
        if self.file_path.trim().is_empty() {
            return Err(ImportError::Validation("file_path is required".to_string()));
        }

        if self.create_new_deck {
            let name = non_blank(&self.deck_name).ok_or_else(|| {
                ImportError::Validation("deck_name is required when creating a new deck".to_string())
            })?;
            return Ok(DeckTarget::New {
                name,
                description: non_blank(&self.deck_description),
                color: non_blank(&self.deck_color),
            });
        }

        let deck_id = non_blank(&self.deck_id).ok_or_else(|| {
            ImportError::Validation("deck_id is required unless create_new_deck is set".to_string())
        })?;
        Ok(DeckTarget::Existing { deck_id })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(header: Option<&str>) -> Result<&str, ImportError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ImportError::Auth("missing authorization header".to_string()))?;

    let (scheme, token) = header
        .split_once(char::is_whitespace)
        .ok_or_else(|| ImportError::Auth("malformed authorization header".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ImportError::Auth("expected a bearer token".to_string()));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ImportError::Auth("empty bearer token".to_string()));
    }
    Ok(token)
}

/// Result of a successful import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub deck_id: String,
    pub created_new_deck: bool,
    pub stats: ImportStats,
}

/// JSON body sent back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ImportResponse {
    Success {
        success: bool,
        deck_id: String,
        created_new_deck: bool,
        import_stats: ImportStats,
    },
    Failure {
        success: bool,
        error: String,
        code: &'static str,
    },
}

impl From<ImportOutcome> for ImportResponse {
    fn from(outcome: ImportOutcome) -> Self {
        ImportResponse::Success {
            success: true,
            deck_id: outcome.deck_id,
            created_new_deck: outcome.created_new_deck,
            import_stats: outcome.stats,
        }
    }
}

impl From<&ImportError> for ImportResponse {
    fn from(err: &ImportError) -> Self {
        ImportResponse::Failure {
            success: false,
            error: err.to_string(),
            code: err.code(),
        }
    }
}
