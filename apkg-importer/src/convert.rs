use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::cloze;
use crate::heuristic::{self, Sides};
use crate::html;
use crate::media::MediaUrlMap;
use crate::models::{Model, Note};
use crate::script::{self, ScriptPredicate};
use crate::template::TemplateFieldMapping;

/// How a model's notes are turned into card sides, decided once per model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionStrategy {
    /// The template names the fields for each side
    Template(TemplateFieldMapping),
    /// Fields are ranked by content
    Heuristic,
}

impl ConversionStrategy {
    pub fn for_model(model: &Model) -> Self {
        let mapping = TemplateFieldMapping::analyze(model);
        if mapping.is_usable() {
            ConversionStrategy::Template(mapping)
        } else {
            log::debug!("Note type {} ({}) has no usable template, using heuristics", model.name, model.id);
            ConversionStrategy::Heuristic
        }
    }

    /// Raw front/back markup, or `None` when nothing is worth showing
    pub fn sides(&self, fields: &[String], predicate: &dyn ScriptPredicate) -> Option<Sides> {
        match self {
            ConversionStrategy::Template(mapping) => template_sides(mapping, fields)
                .or_else(|| heuristic::choose_sides(fields, predicate)),
            ConversionStrategy::Heuristic => heuristic::choose_sides(fields, predicate),
        }
    }
}

/// Build sides from the template's field ordinals.
///
/// `None` when the front would show nothing but audio, so the caller can
/// fall back to heuristics.
fn template_sides(mapping: &TemplateFieldMapping, fields: &[String]) -> Option<Sides> {
    let values = |ordinals: &[usize]| -> Vec<&str> {
        ordinals
            .iter()
            .filter_map(|&ordinal| fields.get(ordinal))
            .map(|value| value.as_str())
            .filter(|value| !value.is_empty())
            .collect()
    };

    let front_values = values(&mapping.front_ordinals);
    let back_values: Vec<&str> = values(&mapping.back_ordinals)
        .into_iter()
        .filter(|value| !front_values.contains(value))
        .collect();

    let front = front_values.join("\n\n");
    if !html::is_display_worthy(&front) {
        return None;
    }

    if mapping.is_cloze && cloze::has_cloze(&front) {
        let (masked, revealed) = cloze::split(&front);
        let mut back = vec![revealed.as_str()];
        back.extend(back_values);
        return Some(Sides {
            front: masked,
            back: back.join("\n\n"),
        });
    }

    let back = if back_values.is_empty() {
        front.clone()
    } else {
        back_values.join("\n\n")
    };

    Some(Sides { front, back })
}

/// Why a note produced no card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No field had displayable content
    NoContent,
    /// A side was empty after markup was stripped
    EmptySide,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::NoContent => f.write_str("no displayable content"),
            IgnoreReason::EmptySide => f.write_str("empty side after cleanup"),
        }
    }
}

/// Final card text for one note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardContent {
    pub note_id: i64,
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteOutcome {
    Card(CardContent),
    Ignored { note_id: i64, reason: IgnoreReason },
}

/// Converts notes to card text using per-model strategies
pub struct Converter {
    strategies: HashMap<i64, ConversionStrategy>,
    predicate: Arc<dyn ScriptPredicate>,
}

impl Converter {
    pub fn new(models: &[Model], predicate: Arc<dyn ScriptPredicate>) -> Self {
        let strategies = models
            .iter()
            .map(|model| (model.id, ConversionStrategy::for_model(model)))
            .collect();

        Self {
            strategies,
            predicate,
        }
    }

    /// Strategy for a model id; unknown models use heuristics
    pub fn strategy(&self, model_id: i64) -> &ConversionStrategy {
        self.strategies
            .get(&model_id)
            .unwrap_or(&ConversionStrategy::Heuristic)
    }

    /// Convert one note, embedding resolved media URLs
    pub fn convert(&self, note: &Note, urls: &MediaUrlMap) -> NoteOutcome {
        let fields = note.fields();
        let predicate = self.predicate.as_ref();

        let Some(sides) = self.strategy(note.model_id).sides(&fields, predicate) else {
            log::debug!("Note {} ignored: {}", note.id, IgnoreReason::NoContent);
            return NoteOutcome::Ignored {
                note_id: note.id,
                reason: IgnoreReason::NoContent,
            };
        };

        let front = finish(&sides.front, urls);
        let back = finish(&sides.back, urls);
        let front = script::refine_front(&front, predicate).unwrap_or(front);

        if front.is_empty() || back.is_empty() {
            log::debug!("Note {} ignored: {}", note.id, IgnoreReason::EmptySide);
            return NoteOutcome::Ignored {
                note_id: note.id,
                reason: IgnoreReason::EmptySide,
            };
        }

        NoteOutcome::Card(CardContent {
            note_id: note.id,
            front,
            back,
            tags: note.tags(),
        })
    }

    /// Convert all notes in parallel, preserving note order
    pub fn convert_all(&self, notes: &[Note], urls: &MediaUrlMap) -> Vec<NoteOutcome> {
        notes.par_iter().map(|note| self.convert(note, urls)).collect()
    }
}

/// Resolve media links, strip markup, collapse blank lines
fn finish(raw: &str, urls: &MediaUrlMap) -> String {
    html::clean_html(&html::rewrite_media_references(raw, urls))
}
