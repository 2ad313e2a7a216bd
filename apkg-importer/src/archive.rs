use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::ImportError;
use crate::models::MediaManifestEntry;
use crate::protobuf;

/// zstd frame magic: 28 B5 2F FD
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Name of the media manifest entry inside the package
const MEDIA_MANIFEST: &str = "media";

/// Check if data starts with zstd magic bytes
pub fn is_zstd_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..4] == ZSTD_MAGIC
}

/// Decompress zstd data, passing through anything without the magic
fn decompress_if_zstd(data: Vec<u8>) -> Result<Vec<u8>, ImportError> {
    if !is_zstd_compressed(&data) {
        return Ok(data);
    }

    zstd::decode_all(data.as_slice())
        .map_err(|e| ImportError::Format(format!("zstd decompression failed: {e}")))
}

/// Collection database variant found in the package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// collection.anki2 (SQLite, no compression)
    Legacy,
    /// collection.anki21 (SQLite, no compression)
    Modern,
    /// collection.anki21b (zstd-compressed SQLite, protobuf media manifest)
    Compressed,
}

impl PackageFormat {
    /// Preference order, newest first
    const PREFERENCE: [PackageFormat; 3] = [
        PackageFormat::Compressed,
        PackageFormat::Modern,
        PackageFormat::Legacy,
    ];

    pub fn db_filename(&self) -> &'static str {
        match self {
            PackageFormat::Legacy => "collection.anki2",
            PackageFormat::Modern => "collection.anki21",
            PackageFormat::Compressed => "collection.anki21b",
        }
    }
}

/// Read-only view over an uploaded package
pub struct PackageArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    format: PackageFormat,
}

impl std::fmt::Debug for PackageArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageArchive")
            .field("format", &self.format)
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl PackageArchive {
    /// Open a package from raw bytes.
    ///
    /// The size ceiling is checked before the bytes are parsed as a zip.
    pub fn from_bytes(data: Vec<u8>, max_bytes: u64) -> Result<Self, ImportError> {
        if data.len() as u64 > max_bytes {
            return Err(ImportError::LimitExceeded(format!(
                "package is {} bytes, maximum is {} bytes",
                data.len(),
                max_bytes
            )));
        }

        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|_| ImportError::Format("invalid package archive".to_string()))?;

        let format = Self::detect_format(&mut archive)?;
        log::debug!("Package contains {}", format.db_filename());

        Ok(Self { archive, format })
    }

    fn detect_format(
        archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    ) -> Result<PackageFormat, ImportError> {
        PackageFormat::PREFERENCE
            .into_iter()
            .find(|format| archive.by_name(format.db_filename()).is_ok())
            .ok_or_else(|| ImportError::Format("missing collection database".to_string()))
    }

    pub fn format(&self) -> PackageFormat {
        self.format
    }

    /// Extract the collection database, decompressed when needed
    pub fn extract_database(&mut self) -> Result<Vec<u8>, ImportError> {
        let data = self
            .read_entry(self.format.db_filename())?
            .ok_or_else(|| ImportError::Format("missing collection database".to_string()))?;

        if self.format == PackageFormat::Compressed {
            decompress_if_zstd(data)
        } else {
            Ok(data)
        }
    }

    /// Read the media manifest.
    ///
    /// A missing, empty or undecodable manifest means "no media".
    pub fn media_manifest(&mut self) -> Result<Vec<MediaManifestEntry>, ImportError> {
        let Some(data) = self.read_entry(MEDIA_MANIFEST)? else {
            return Ok(Vec::new());
        };

        if data.is_empty() {
            return Ok(Vec::new());
        }

        let entries = if is_zstd_compressed(&data) {
            match decompress_if_zstd(data) {
                Ok(raw) => parse_protobuf_manifest(&raw),
                Err(e) => {
                    log::warn!("Ignoring media manifest: {}", e);
                    Vec::new()
                }
            }
        } else {
            parse_json_manifest(&data)
        };

        Ok(entries)
    }

    /// Extract a media blob by its stored id, decompressed when needed
    pub fn extract_media(&mut self, stored_id: &str) -> Result<Option<Vec<u8>>, ImportError> {
        match self.read_entry(stored_id)? {
            Some(data) => decompress_if_zstd(data).map(Some),
            None => Ok(None),
        }
    }

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>, ImportError> {
        match self.archive.by_name(name) {
            Ok(mut file) => {
                let mut data = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut data)
                    .map_err(|e| ImportError::Format(format!("corrupt entry {name}: {e}")))?;
                Ok(Some(data))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse `{"0": "image.jpg", "1": "audio.mp3", ...}`
fn parse_json_manifest(data: &[u8]) -> Vec<MediaManifestEntry> {
    let content = String::from_utf8_lossy(data);
    let content = content.trim();
    if content.is_empty() {
        return Vec::new();
    }

    let mapping: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(content)
    {
        Ok(mapping) => mapping,
        Err(e) => {
            log::warn!("Media manifest is not valid JSON, ignoring it: {}", e);
            return Vec::new();
        }
    };

    let mut entries: Vec<MediaManifestEntry> = mapping
        .into_iter()
        .filter_map(|(stored_id, name)| {
            let original_filename = name.as_str()?.to_string();
            Some(MediaManifestEntry {
                stored_id,
                original_filename,
            })
        })
        .collect();

    sort_by_stored_id(&mut entries);
    entries
}

/// Parse a protobuf `MediaEntries { repeated MediaEntry entries = 1 }`.
///
/// Each `MediaEntry` carries its filename in field 1; the blob is stored
/// under its position in the list.
fn parse_protobuf_manifest(data: &[u8]) -> Vec<MediaManifestEntry> {
    protobuf::repeated_bytes(data, 1)
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let name = protobuf::string_field(entry, 1)?;
            (!name.is_empty()).then(|| MediaManifestEntry {
                stored_id: index.to_string(),
                original_filename: name,
            })
        })
        .collect()
}

/// Numeric ids sort numerically, anything else after them lexically
fn sort_by_stored_id(entries: &mut [MediaManifestEntry]) {
    entries.sort_by_cached_key(|e| (e.stored_id.parse::<u64>().unwrap_or(u64::MAX), e.stored_id.clone()));
}
