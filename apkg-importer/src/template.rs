//! Field-reference discovery in card templates.
//!
//! Only the common template subset is understood: plain `{{Field}}`
//! references and `filter:Field` chains such as `cloze:`, `type:` and
//! `hint:`. Conditional sections are skipped rather than evaluated.

use std::collections::BTreeSet;

use crate::models::{Model, ModelKind};

/// Pseudo-fields rendered by the template engine, compared after
/// lowercasing and removing spaces, underscores and dashes
const RESERVED_FIELDS: &[&str] = &[
    "frontside",
    "tags",
    "card",
    "cardtype",
    "cardflag",
    "deck",
    "deckname",
    "subdeck",
];

/// Fields a model's representative template shows on each side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFieldMapping {
    pub front_field_names: BTreeSet<String>,
    pub back_field_names: BTreeSet<String>,
    /// Ordinals in template appearance order, deduplicated
    pub front_ordinals: Vec<usize>,
    pub back_ordinals: Vec<usize>,
    pub is_cloze: bool,
}

impl TemplateFieldMapping {
    /// Derive the mapping from the model's first template
    pub fn analyze(model: &Model) -> Self {
        let is_cloze = model.kind == ModelKind::Cloze;

        let Some(template) = model.templates.first() else {
            return Self {
                is_cloze,
                ..Self::default()
            };
        };

        let (front_field_names, front_ordinals) = resolve(model, &template.front_markup);
        let (back_field_names, back_ordinals) = resolve(model, &template.back_markup);

        Self {
            front_field_names,
            back_field_names,
            front_ordinals,
            back_ordinals,
            is_cloze,
        }
    }

    /// True when the template references at least one declared field
    pub fn is_usable(&self) -> bool {
        !self.front_ordinals.is_empty() || !self.back_ordinals.is_empty()
    }
}

fn resolve(model: &Model, markup: &str) -> (BTreeSet<String>, Vec<usize>) {
    let mut names = BTreeSet::new();
    let mut ordinals = Vec::new();

    for name in field_references(markup) {
        if let Some(ordinal) = model.ordinal_of(&name) {
            if !ordinals.contains(&ordinal) {
                ordinals.push(ordinal);
            }
            names.insert(name);
        }
    }

    (names, ordinals)
}

/// Scan `{{...}}` tokens and return the data-field names they reference,
/// in order of appearance.
///
/// Unterminated tokens are ignored; `{{{Field}}}` is read as `{{Field}}`.
pub fn field_references(markup: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = markup;

    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };

        if let Some(name) = normalize_token(&after_open[..end]) {
            names.push(name);
        }
        rest = &after_open[end + 2..];
    }

    names
}

/// Reduce a raw token to a field name, or `None` for sections, comments
/// and reserved pseudo-fields
fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim_start_matches('{').trim();

    // Conditional sections, their closers, and comments
    if token.is_empty() || token.starts_with(['#', '^', '/', '!']) {
        return None;
    }

    // Rendering filters after a pipe are dropped
    let token = token.split('|').next().unwrap_or(token);

    // Modifier chains: "cloze:Text", "type:cloze:Text", "hint:Extra", "furigana:Reading"
    let name = token.rsplit(':').next().unwrap_or(token).trim();

    if name.is_empty() || is_reserved(name) {
        return None;
    }

    Some(name.to_string())
}

fn is_reserved(name: &str) -> bool {
    let key: String = name
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect();
    RESERVED_FIELDS.contains(&key.as_str())
}
