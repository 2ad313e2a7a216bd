use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Default package size ceiling (100 MiB).
pub const DEFAULT_MAX_PACKAGE_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_NOTES: usize = 10_000;
pub const DEFAULT_MAX_MEDIA_FILES: usize = 200;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MEDIA_BUCKET: &str = "card-media";

/// Static ceilings and destinations for one import.
///
/// Passed explicitly into the pipeline so tests can run with tiny limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Packages larger than this are rejected before the zip is opened.
    pub max_package_bytes: u64,
    /// Maximum number of note rows read from the collection.
    pub max_notes: usize,
    /// Referenced media beyond this count are skipped, not failed.
    pub max_media_files: usize,
    /// Cards per insert batch.
    pub batch_size: usize,
    /// Whole-pipeline deadline, checked between phases.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Bucket that receives uploaded media.
    pub media_bucket: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_package_bytes: DEFAULT_MAX_PACKAGE_BYTES,
            max_notes: DEFAULT_MAX_NOTES,
            max_media_files: DEFAULT_MAX_MEDIA_FILES,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            media_bucket: DEFAULT_MEDIA_BUCKET.to_string(),
        }
    }
}

impl ImportConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// | Env Var                     | Default       |
    /// |-----------------------------|---------------|
    /// | `APKG_MAX_PACKAGE_BYTES`    | `104857600`   |
    /// | `APKG_MAX_NOTES`            | `10000`       |
    /// | `APKG_MAX_MEDIA_FILES`      | `200`         |
    /// | `APKG_BATCH_SIZE`           | `100`         |
    /// | `APKG_TIMEOUT_SECS`         | `120`         |
    /// | `APKG_MEDIA_BUCKET`         | `card-media`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_package_bytes: env_or("APKG_MAX_PACKAGE_BYTES", defaults.max_package_bytes),
            max_notes: env_or("APKG_MAX_NOTES", defaults.max_notes),
            max_media_files: env_or("APKG_MAX_MEDIA_FILES", defaults.max_media_files),
            batch_size: env_or("APKG_BATCH_SIZE", defaults.batch_size).max(1),
            timeout: Duration::from_secs(env_or("APKG_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)),
            media_bucket: std::env::var("APKG_MEDIA_BUCKET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.media_bucket),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Ignoring malformed {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
