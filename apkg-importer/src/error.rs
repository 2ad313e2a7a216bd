use thiserror::Error;

/// Boxed error returned by external collaborators (storage, card store, identity).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types that can terminate a package import
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid package: {0}")]
    Format(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// A card batch failed; `committed` cards from earlier batches stay persisted.
    #[error("Failed to save cards after {committed} were committed: {message}")]
    Persistence { committed: usize, message: String },

    #[error("Import timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl ImportError {
    /// Machine-readable code sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        "IMPORT_ERROR"
    }

    /// HTTP status used for every terminal failure.
    pub fn status_code(&self) -> u16 {
        400
    }
}

impl From<std::io::Error> for ImportError {
    fn from(e: std::io::Error) -> Self {
        ImportError::Storage(format!("local I/O failure: {e}"))
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::FileNotFound => {
                ImportError::Format("missing archive entry".to_string())
            }
            zip::result::ZipError::InvalidArchive(_) | zip::result::ZipError::UnsupportedArchive(_) => {
                ImportError::Format("invalid package archive".to_string())
            }
            _ => ImportError::Format(format!("unreadable package archive: {e}")),
        }
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(e: rusqlite::Error) -> Self {
        ImportError::Format(format!("collection database: {e}"))
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(e: serde_json::Error) -> Self {
        ImportError::Format(format!("JSON parsing error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_message_mentions_committed_count() {
        let err = ImportError::Persistence {
            committed: 200,
            message: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to save cards after 200 were committed: connection reset"
        );
        assert_eq!(err.code(), "IMPORT_ERROR");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_zip_errors_are_format_errors() {
        let err: ImportError = zip::result::ZipError::InvalidArchive("bad".into()).into();
        assert!(matches!(err, ImportError::Format(_)));
    }
}
