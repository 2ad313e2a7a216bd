use std::collections::{BTreeMap, BTreeSet, HashMap};

use sha2::{Digest, Sha256};

use crate::archive::PackageArchive;
use crate::collaborators::ObjectStorage;
use crate::html::{img_source, IMG_RE, SOUND_RE};
use crate::models::{MediaManifestEntry, Note};

/// Resolved media: original filename -> public URL
pub type MediaUrlMap = BTreeMap<String, String>;

/// Known audio file extensions
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac", "aac", "opus", "wma"];

/// Known image file extensions
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "ico", "tiff"];

/// Magic bytes for file format detection
mod magic {
    pub const JPEG: [u8; 2] = [0xFF, 0xD8];
    pub const PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    pub const GIF87: [u8; 6] = [0x47, 0x49, 0x46, 0x38, 0x37, 0x61];
    pub const GIF89: [u8; 6] = [0x47, 0x49, 0x46, 0x38, 0x39, 0x61];
    pub const RIFF: [u8; 4] = [0x52, 0x49, 0x46, 0x46]; // WEBP or WAVE at offset 8
    pub const MP3_ID3: [u8; 3] = [0x49, 0x44, 0x33]; // "ID3"
    pub const OGG: [u8; 4] = [0x4F, 0x67, 0x67, 0x53]; // "OggS"
    pub const FLAC: [u8; 4] = [0x66, 0x4C, 0x61, 0x43]; // "fLaC"
}

/// Media file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Image,
    Unknown,
}

fn extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Determine media type from filename extension
pub fn media_type_from_extension(filename: &str) -> MediaType {
    let ext = extension(filename);

    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaType::Audio
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaType::Image
    } else {
        MediaType::Unknown
    }
}

/// MIME type for an uploaded object, from its extension
pub fn content_type(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "wma" => "audio/x-ms-wma",
        _ => "application/octet-stream",
    }
}

/// Validate that data looks like a valid image based on magic bytes
pub fn is_valid_image(data: &[u8]) -> bool {
    if data.len() < 8 {
        return false;
    }

    if data.starts_with(&magic::JPEG) || data.starts_with(&magic::PNG) {
        return true;
    }

    if data.starts_with(&magic::GIF87) || data.starts_with(&magic::GIF89) {
        return true;
    }

    // WebP (RIFF....WEBP)
    if data.starts_with(&magic::RIFF) && data.len() >= 12 && &data[8..12] == b"WEBP" {
        return true;
    }

    // BMP
    if data[0] == b'B' && data[1] == b'M' {
        return true;
    }

    // SVG (optionally after leading whitespace)
    let trimmed: Vec<u8> = data
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(5)
        .collect();
    trimmed.starts_with(b"<?xml") || trimmed.starts_with(b"<svg")
}

/// Validate that data looks like valid audio based on magic bytes
pub fn is_valid_audio(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }

    // MP3 with ID3 tag, or bare MP3 sync word
    if data.starts_with(&magic::MP3_ID3) || (data[0] == 0xFF && (data[1] & 0xE0) == 0xE0) {
        return true;
    }

    if data.starts_with(&magic::OGG) || data.starts_with(&magic::FLAC) {
        return true;
    }

    // WAV (RIFF....WAVE)
    if data.starts_with(&magic::RIFF) && data.len() >= 12 && &data[8..12] == b"WAVE" {
        return true;
    }

    // M4A/AAC (ftyp box)
    data.len() >= 8 && &data[4..8] == b"ftyp"
}

/// Filenames referenced by `[sound:...]` markers or `<img src=...>` tags
/// anywhere in the notes' raw field text
pub fn referenced_filenames(notes: &[Note]) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();

    for note in notes {
        let text = &note.raw_fields;

        for cap in SOUND_RE.captures_iter(text) {
            refs.insert(cap[1].trim().to_string());
        }

        for cap in IMG_RE.captures_iter(text) {
            let filename = img_source(&cap);
            if !filename.is_empty() {
                refs.insert(filename);
            }
        }
    }

    refs
}

/// Manifest entries worth extracting: referenced by some note, at most `max_files`
pub fn plan_extraction(
    manifest: &[MediaManifestEntry],
    referenced: &BTreeSet<String>,
    max_files: usize,
) -> Vec<MediaManifestEntry> {
    let mut plan: Vec<MediaManifestEntry> = manifest
        .iter()
        .filter(|entry| referenced.contains(&entry.original_filename))
        .cloned()
        .collect();

    let skipped = manifest.len() - plan.len();
    if skipped > 0 {
        log::debug!("Skipping {} unreferenced media files", skipped);
    }

    if plan.len() > max_files {
        log::warn!(
            "Package references {} media files, only the first {} are imported",
            plan.len(),
            max_files
        );
        plan.truncate(max_files);
    }

    plan
}

/// Content-addressed object path: `{prefix}/{sha256}.{ext}`
pub fn object_path(prefix: &str, filename: &str, data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let ext = extension(filename);
    if ext.is_empty() {
        format!("{prefix}/{digest:x}")
    } else {
        format!("{prefix}/{digest:x}.{ext}")
    }
}

/// An object written by [`MediaUploader::upload_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub filename: String,
    pub path: String,
}

/// Result of uploading the referenced media
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedMedia {
    pub objects: Vec<UploadedObject>,
    pub urls: MediaUrlMap,
}

/// Extracts referenced media from a package and stores it in a bucket
pub struct MediaUploader<'a> {
    storage: &'a dyn ObjectStorage,
    bucket: &'a str,
}

impl<'a> MediaUploader<'a> {
    pub fn new(storage: &'a dyn ObjectStorage, bucket: &'a str) -> Self {
        Self { storage, bucket }
    }

    /// Upload every planned entry under `prefix`.
    ///
    /// Extraction or upload failures are logged and the file is left
    /// unresolved.
    pub fn upload_all(
        &self,
        archive: &mut PackageArchive,
        plan: &[MediaManifestEntry],
        prefix: &str,
    ) -> UploadedMedia {
        let mut uploaded = UploadedMedia::default();

        for entry in plan {
            let filename = &entry.original_filename;

            let data = match archive.extract_media(&entry.stored_id) {
                Ok(Some(data)) => data,
                Ok(None) => {
                    log::warn!("Media file {} (entry {}) is missing from the package", filename, entry.stored_id);
                    continue;
                }
                Err(e) => {
                    log::warn!("Failed to extract {}: {}", filename, e);
                    continue;
                }
            };

            let looks_valid = match media_type_from_extension(filename) {
                MediaType::Image => is_valid_image(&data),
                MediaType::Audio => is_valid_audio(&data),
                MediaType::Unknown => true,
            };
            if !looks_valid {
                log::warn!("Media file {} may be invalid (header check failed)", filename);
            }

            let path = object_path(prefix, filename, &data);
            let already_stored = uploaded.objects.iter().any(|object| object.path == path);
            if already_stored {
                log::debug!("{} has the same content as an uploaded file", filename);
            } else if let Err(e) = self
                .storage
                .upload(self.bucket, &path, &data, content_type(filename))
            {
                log::warn!("Failed to upload {}: {}", filename, e);
                continue;
            }

            uploaded
                .urls
                .insert(filename.clone(), self.storage.public_url(self.bucket, &path));
            uploaded.objects.push(UploadedObject {
                filename: filename.clone(),
                path,
            });
        }

        uploaded
    }

    /// Move uploaded objects under `prefix` and rewrite their URLs.
    ///
    /// Each stored object is moved once, even when several filenames share
    /// its content. An object that fails to move keeps its original location
    /// and URL.
    pub fn relocate(&self, uploaded: UploadedMedia, prefix: &str) -> UploadedMedia {
        let mut relocated = UploadedMedia {
            objects: Vec::with_capacity(uploaded.objects.len()),
            urls: uploaded.urls,
        };
        // source path -> new path, or None when the move failed
        let mut moved: HashMap<String, Option<String>> = HashMap::new();

        for object in uploaded.objects {
            let target = match moved.get(&object.path) {
                Some(target) => target.clone(),
                None => {
                    let target = self.move_one(&object, prefix);
                    moved.insert(object.path.clone(), target.clone());
                    target
                }
            };

            match target {
                Some(target) => {
                    relocated.urls.insert(
                        object.filename.clone(),
                        self.storage.public_url(self.bucket, &target),
                    );
                    relocated.objects.push(UploadedObject {
                        filename: object.filename,
                        path: target,
                    });
                }
                None => relocated.objects.push(object),
            }
        }

        relocated
    }

    fn move_one(&self, object: &UploadedObject, prefix: &str) -> Option<String> {
        let file_part = object.path.rsplit('/').next().unwrap_or(&object.path);
        let target = format!("{prefix}/{file_part}");

        match self.storage.move_object(self.bucket, &object.path, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                log::warn!(
                    "Failed to move {} to {}, keeping it at {}: {}",
                    object.filename,
                    target,
                    object.path,
                    e
                );
                None
            }
        }
    }
}
