use serde::{Deserialize, Serialize};

/// Separator between a note's field values in the `flds` column
pub const FIELD_SEPARATOR: char = '\x1f';

/// Progress states during an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportProgress {
    Downloading,
    Extracting,
    ReadingNotes,
    Converting,
    UploadingMedia,
    Persisting,
    Complete,
}

/// Progress callback the host can implement to follow an import
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, progress: ImportProgress);
}

/// Callback used when the host does not care about progress
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _progress: ImportProgress) {}
}

/// One row of the package's `notes` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: i64,
    pub model_id: i64,
    /// Field values joined by [`FIELD_SEPARATOR`]
    pub raw_fields: String,
    /// Space-separated tags
    pub raw_tags: String,
}

impl Note {
    /// Split the raw fields into trimmed positional values.
    ///
    /// The count need not match the model's field count.
    pub fn fields(&self) -> Vec<String> {
        self.raw_fields
            .split(FIELD_SEPARATOR)
            .map(|s| s.trim().to_string())
            .collect()
    }

    pub fn tags(&self) -> Vec<String> {
        self.raw_tags
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Whether a note type renders separate sides or cloze deletions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    Standard,
    Cloze,
}

/// A declared field of a note type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ordinal: usize,
}

/// Front/back markup of one card template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub front_markup: String,
    pub back_markup: String,
}

/// A note type: field schema plus rendering templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: i64,
    pub name: String,
    /// Sorted by ordinal
    pub fields: Vec<FieldDef>,
    pub templates: Vec<Template>,
    pub kind: ModelKind,
}

impl Model {
    /// Ordinal of the field called `name`, exact match first, then case-insensitive
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
            .map(|f| f.ordinal)
    }
}

/// Entry of the package media manifest (stored id -> original filename)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaManifestEntry {
    /// Archive entry name the blob is stored under ("0", "1", ...)
    pub stored_id: String,
    pub original_filename: String,
}

/// A card ready to be written to the target store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedCard {
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
    pub deck_id: String,
    pub owner_id: String,
}

impl ConvertedCard {
    pub fn is_complete(&self) -> bool {
        !self.front.trim().is_empty() && !self.back.trim().is_empty()
    }
}

/// Deck row created when importing into a new deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDeck {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Counters reported back to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub total_notes: usize,
    pub cards_created: usize,
    pub notes_ignored: usize,
    pub media_files_processed: usize,
    pub elapsed_ms: u64,
}
