use std::io::Write;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::ImportError;
use crate::models::{FieldDef, Model, ModelKind, Note, Template};
use crate::protobuf;

/// `type` value of a cloze note type in the legacy models JSON
const LEGACY_CLOZE_TYPE: i64 = 1;

/// `kind` value of a cloze note type in the protobuf notetype config
const CONFIG_CLOZE_KIND: u64 = 1;

/// Collection database wrapper.
///
/// The database is materialized into a temporary file that is deleted when
/// this value is dropped, whatever the outcome of the import.
pub struct CollectionDatabase {
    conn: Connection,
    _temp_file: NamedTempFile,
}

impl CollectionDatabase {
    /// Open a database from raw bytes
    pub fn open_from_bytes(data: &[u8]) -> Result<Self, ImportError> {
        let mut temp_file = tempfile::Builder::new()
            .prefix("apkg_import_")
            .suffix(".db")
            .tempfile()?;
        temp_file.write_all(data)?;
        temp_file.flush()?;

        let conn = Connection::open_with_flags(
            temp_file.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn,
            _temp_file: temp_file,
        })
    }

    /// Number of rows in the notes table
    pub fn note_count(&self) -> Result<usize, ImportError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Read all note types.
    ///
    /// Malformed entries are skipped with a warning.
    pub fn read_models(&self) -> Result<Vec<Model>, ImportError> {
        let models_json: Option<String> = self
            .conn
            .query_row("SELECT models FROM col LIMIT 1", [], |row| {
                text_or_blob(row.get_ref(0)?)
            })
            .optional()?
            .flatten();

        let mut models = match models_json {
            Some(json) if !json.trim().is_empty() && json.trim() != "{}" => parse_models_json(&json),
            _ => Vec::new(),
        };

        // Anki 2.1.50+ keeps note types in their own tables
        if models.is_empty() && self.table_exists("notetypes")? {
            models = self.read_models_from_tables()?;
        }

        models.sort_by_key(|m| m.id);
        Ok(models)
    }

    fn table_exists(&self, name: &str) -> Result<bool, ImportError> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn read_models_from_tables(&self) -> Result<Vec<Model>, ImportError> {
        let mut models = Vec::new();

        let mut stmt = self.conn.prepare("SELECT id, name, config FROM notetypes")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name = text_or_blob(row.get_ref(1)?)?.unwrap_or_default();
            let config = blob(row.get_ref(2)?);
            Ok((id, name, config))
        })?;

        for row in rows {
            let (id, name, config) = row?;
            let kind = match protobuf::varint_field(&config, 1) {
                Some(CONFIG_CLOZE_KIND) => ModelKind::Cloze,
                _ => ModelKind::Standard,
            };
            models.push(Model {
                id,
                name,
                fields: Vec::new(),
                templates: Vec::new(),
                kind,
            });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT ntid, ord, name FROM fields ORDER BY ntid, ord")?;
        let rows = stmt.query_map([], |row| {
            let ntid: i64 = row.get(0)?;
            let ord: i64 = row.get(1)?;
            let name = text_or_blob(row.get_ref(2)?)?.unwrap_or_default();
            Ok((ntid, ord, name))
        })?;
        for row in rows {
            let (ntid, ord, name) = row?;
            if let Some(model) = models.iter_mut().find(|m| m.id == ntid) {
                model.fields.push(FieldDef {
                    name,
                    ordinal: ord.max(0) as usize,
                });
            }
        }

        let mut stmt = self
            .conn
            .prepare("SELECT ntid, name, config FROM templates ORDER BY ntid, ord")?;
        let rows = stmt.query_map([], |row| {
            let ntid: i64 = row.get(0)?;
            let name = text_or_blob(row.get_ref(1)?)?.unwrap_or_default();
            let config = blob(row.get_ref(2)?);
            Ok((ntid, name, config))
        })?;
        for row in rows {
            let (ntid, name, config) = row?;
            if let Some(model) = models.iter_mut().find(|m| m.id == ntid) {
                model.templates.push(Template {
                    name,
                    front_markup: protobuf::string_field(&config, 1).unwrap_or_default(),
                    back_markup: protobuf::string_field(&config, 2).unwrap_or_default(),
                });
            }
        }

        Ok(models)
    }

    /// Read every note, failing if there are none or more than `max_notes`
    pub fn read_notes(&self, max_notes: usize) -> Result<Vec<Note>, ImportError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, mid, flds, tags FROM notes ORDER BY id LIMIT ?1")?;

        let limit = i64::try_from(max_notes.saturating_add(1)).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], |row| {
            Ok(Note {
                id: row.get(0)?,
                model_id: row.get(1)?,
                raw_fields: text_or_blob(row.get_ref(2)?)?.unwrap_or_default(),
                raw_tags: text_or_blob(row.get_ref(3)?)?.unwrap_or_default(),
            })
        })?;

        let notes = rows.collect::<Result<Vec<_>, _>>()?;

        if notes.len() > max_notes {
            return Err(too_many_notes(max_notes));
        }
        if notes.is_empty() {
            return Err(ImportError::Format("no notes found".to_string()));
        }

        Ok(notes)
    }
}

pub(crate) fn too_many_notes(max_notes: usize) -> ImportError {
    ImportError::LimitExceeded(format!("package has more than {max_notes} notes"))
}

/// Read a column that may be stored as TEXT or BLOB
fn text_or_blob(value: ValueRef<'_>) -> rusqlite::Result<Option<String>> {
    Ok(match value {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        _ => None,
    })
}

fn blob(value: ValueRef<'_>) -> Vec<u8> {
    match value {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: i64,
    flds: Vec<RawField>,
    #[serde(default)]
    tmpls: Vec<RawTemplate>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(default)]
    ord: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    name: String,
    #[serde(default)]
    qfmt: String,
    #[serde(default)]
    afmt: String,
    #[serde(default)]
    ord: Option<usize>,
}

/// Parse the `col.models` JSON object, one model at a time
fn parse_models_json(json: &str) -> Vec<Model> {
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Note type JSON is unreadable, falling back to heuristics: {}", e);
            return Vec::new();
        }
    };

    let Value::Object(map) = value else {
        log::warn!("Note type JSON is not an object, falling back to heuristics");
        return Vec::new();
    };

    let mut models = Vec::with_capacity(map.len());
    for (key, entry) in map {
        match parse_model(&key, entry) {
            Ok(model) => models.push(model),
            Err(e) => log::warn!("Skipping malformed note type {}: {}", key, e),
        }
    }
    models
}

fn parse_model(key: &str, entry: Value) -> Result<Model, String> {
    let raw: RawModel = serde_json::from_value(entry).map_err(|e| e.to_string())?;

    let id = match &raw.id {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .or_else(|| key.parse().ok())
    .ok_or_else(|| format!("no usable id in {key:?}"))?;

    let mut fields: Vec<FieldDef> = raw
        .flds
        .into_iter()
        .enumerate()
        .map(|(position, f)| FieldDef {
            name: f.name,
            ordinal: f.ord.unwrap_or(position),
        })
        .collect();
    fields.sort_by_key(|f| f.ordinal);

    let mut tmpls = raw.tmpls;
    tmpls.sort_by_key(|t| t.ord.unwrap_or(usize::MAX));
    let templates = tmpls
        .into_iter()
        .map(|t| Template {
            name: t.name,
            front_markup: t.qfmt,
            back_markup: t.afmt,
        })
        .collect();

    Ok(Model {
        id,
        name: raw.name,
        fields,
        templates,
        kind: if raw.kind == LEGACY_CLOZE_TYPE {
            ModelKind::Cloze
        } else {
            ModelKind::Standard
        },
    })
}
