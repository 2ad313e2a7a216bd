//! Front/back guessing for notes without a usable template.
//!
//! Every non-empty field becomes an immutable [`Candidate`]; scoring is a
//! pure function of the candidate and facts about its sibling fields, so
//! the same note always converts the same way.

use std::cmp::Ordering;

use crate::cloze;
use crate::html;
use crate::script::{ScriptPredicate, ScriptProfile};

/// Extra back fields appended when they score close to the chosen back
pub const MAX_EXTRA_BACK_FIELDS: usize = 2;

/// How far below the back score an extra field may score and still be kept
pub const EXTRA_BACK_MARGIN: f64 = 1.0;

/// Visible length from which a field counts as long genuine content
const LONG_CONTENT_CHARS: usize = 40;

/// Raw markup length from which markup-heavy fields are penalized
const LONG_MARKUP_CHARS: usize = 300;

/// Facts about one field that scoring depends on
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Position in the note's field list
    pub position: usize,
    /// Field value as stored, markup included
    pub raw: String,
    /// Visible characters, without markup or sound markers
    pub char_len: usize,
    pub line_count: usize,
    pub digits_only: bool,
    pub has_markup: bool,
    pub audio_only: bool,
    pub has_cloze: bool,
    pub script: ScriptProfile,
    /// Short punctuation-free Latin phrase such as "letter n"
    pub looks_like_label: bool,
}

impl Candidate {
    pub fn new(position: usize, raw: &str, predicate: &dyn ScriptPredicate) -> Self {
        let visible = html::visible_text(raw);
        let script = ScriptProfile::of(&visible, predicate);

        Self {
            position,
            raw: raw.to_string(),
            char_len: visible.chars().count(),
            line_count: visible.lines().filter(|l| !l.trim().is_empty()).count(),
            digits_only: !visible.is_empty()
                && visible.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()),
            has_markup: raw.contains('<') && raw.contains('>'),
            audio_only: html::is_audio_only(raw),
            has_cloze: cloze::has_cloze(raw),
            looks_like_label: looks_like_label(&visible, &script),
            script,
        }
    }

    /// Can be shown as a card side on its own
    pub fn is_display_worthy(&self) -> bool {
        !self.audio_only && html::is_display_worthy(&self.raw)
    }

    /// Numbers (sequence ids, page numbers) never make the prompt
    fn is_front_eligible(&self) -> bool {
        !self.digits_only
    }
}

fn looks_like_label(visible: &str, script: &ScriptProfile) -> bool {
    let words: Vec<&str> = visible.split_whitespace().collect();
    script.target == 0
        && (2..=3).contains(&words.len())
        && visible.chars().count() <= 20
        && visible.chars().all(|c| c.is_ascii_alphabetic() || c == ' ')
}

/// What a candidate's siblings look like
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Peers {
    /// Another field holds long, non-label content
    pub long_content: bool,
    /// Another field holds target-script text
    pub target_script: bool,
}

impl Peers {
    pub fn of(candidates: &[Candidate], index: usize) -> Self {
        candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .fold(Self::default(), |peers, (_, other)| Self {
                long_content: peers.long_content
                    || (other.char_len >= LONG_CONTENT_CHARS && !other.looks_like_label),
                target_script: peers.target_script || other.script.target > 0,
            })
    }
}

/// Mid-range lengths preferred, extremes penalized
fn length_score(chars: usize) -> f64 {
    match chars {
        0 => -5.0,
        1..=2 => 1.0,
        3..=40 => 2.0,
        41..=120 => 1.5,
        121..=300 => 0.5,
        301..=600 => -0.5,
        _ => -1.5,
    }
}

/// Penalties shared by both sides.
///
/// Audio-only fields never reach scoring; [`choose_sides`] drops them first.
fn structural_score(c: &Candidate, max_lines: usize) -> f64 {
    let mut score = length_score(c.char_len);

    if c.digits_only {
        score -= 10.0;
    }
    if c.line_count > max_lines * 2 {
        score -= 3.0;
    } else if c.line_count > max_lines {
        score -= 1.5;
    }
    if c.has_markup && c.raw.len() > LONG_MARKUP_CHARS {
        score -= 1.0;
    }

    score
}

/// How well a field works as the prompt
pub fn front_score(c: &Candidate, peers: &Peers) -> f64 {
    let mut score = structural_score(c, 5);

    if c.has_cloze {
        score += 3.0;
    }

    // Target-script fields make the prompt in mixed-alphabet decks
    if c.script.target > 0 && c.script.target_ratio() >= 0.6 {
        score += 2.0;
    }

    if c.looks_like_label && peers.target_script {
        score -= if peers.long_content { 4.0 } else { 2.0 };
    }

    // Earlier fields win ties
    score - 0.1 * c.position as f64
}

/// How well a field works as the answer
pub fn back_score(c: &Candidate, peers: &Peers) -> f64 {
    let mut score = structural_score(c, 15);

    // Latin gloss that still carries some target script, e.g. "кот (cat)"
    if c.script.target > 0 && c.script.target_ratio() <= 0.4 {
        score += 1.5;
    }

    if c.looks_like_label && peers.target_script {
        score -= 1.0;
    }

    score - 0.05 * c.position as f64
}

/// Raw front and back markup chosen for a note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sides {
    pub front: String,
    pub back: String,
}

/// Pick the best index by score; ties go to the earlier field
fn best(scored: &[(usize, f64)]) -> Option<(usize, f64)> {
    scored.iter().copied().max_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.0.cmp(&a.0))
    })
}

/// Choose front and back from a note's fields.
///
/// Returns `None` when no field is worth showing.
pub fn choose_sides(fields: &[String], predicate: &dyn ScriptPredicate) -> Option<Sides> {
    let candidates: Vec<Candidate> = fields
        .iter()
        .enumerate()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(position, raw)| Candidate::new(position, raw, predicate))
        .filter(Candidate::is_display_worthy)
        .collect();

    match candidates.as_slice() {
        [] => None,
        [only] => Some(single_field(&only.raw)),
        _ => choose_from_many(&candidates),
    }
}

fn single_field(raw: &str) -> Sides {
    if cloze::has_cloze(raw) {
        let (front, back) = cloze::split(raw);
        Sides { front, back }
    } else {
        Sides {
            front: raw.to_string(),
            back: raw.to_string(),
        }
    }
}

fn choose_from_many(candidates: &[Candidate]) -> Option<Sides> {
    let peers: Vec<Peers> = (0..candidates.len())
        .map(|i| Peers::of(candidates, i))
        .collect();

    let front_scores: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_front_eligible())
        .map(|(i, c)| (i, front_score(c, &peers[i])))
        .collect();
    let (front_index, _) = best(&front_scores)?;
    let front = &candidates[front_index];

    let back_scores: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != front_index)
        .map(|(i, c)| (i, back_score(c, &peers[i])))
        .collect();

    let mut back_parts: Vec<&str> = Vec::new();
    if let Some((back_index, back_best)) = best(&back_scores) {
        let mut extras: Vec<(usize, f64)> = back_scores
            .iter()
            .copied()
            .filter(|(i, s)| *i != back_index && *s >= back_best - EXTRA_BACK_MARGIN)
            .collect();
        extras.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        extras.truncate(MAX_EXTRA_BACK_FIELDS);

        let mut chosen: Vec<usize> = extras.into_iter().map(|(i, _)| i).collect();
        chosen.sort_unstable();

        back_parts.push(&candidates[back_index].raw);
        back_parts.extend(chosen.into_iter().map(|i| candidates[i].raw.as_str()));
    }

    if front.has_cloze {
        let (masked, revealed) = cloze::split(&front.raw);
        let mut back = vec![revealed.as_str()];
        back.extend(back_parts);
        return Some(Sides {
            front: masked,
            back: back.join("\n\n"),
        });
    }

    let back = if back_parts.is_empty() {
        front.raw.clone()
    } else {
        back_parts.join("\n\n")
    };

    Some(Sides {
        front: front.raw.clone(),
        back,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ExtendedScripts;

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn choose(values: &[&str]) -> Option<Sides> {
        choose_sides(&fields(values), &ExtendedScripts)
    }

    #[test]
    fn test_no_content() {
        assert_eq!(choose(&["", "  "]), None);
        assert_eq!(choose(&["[sound:only.mp3]"]), None);
        assert_eq!(choose(&["[sound:a.mp3]", "", "[sound:b.mp3]"]), None);
    }

    #[test]
    fn test_single_field_is_self_referential() {
        let sides = choose(&["", "Photosynthesis"]).unwrap();
        assert_eq!(sides.front, "Photosynthesis");
        assert_eq!(sides.back, "Photosynthesis");
    }

    #[test]
    fn test_single_cloze_field() {
        let sides = choose(&["The sky is {{c1::blue}}", "[sound:sky.mp3]"]).unwrap();
        assert_eq!(sides.front, "The sky is [...]");
        assert_eq!(sides.back, "The sky is blue");
    }

    #[test]
    fn test_two_fields_keep_natural_order() {
        let sides = choose(&["Capital of France", "Paris"]).unwrap();
        assert_eq!(sides.front, "Capital of France");
        assert_eq!(sides.back, "Paris");
    }

    #[test]
    fn test_deterministic() {
        let values = ["dog", "собака", "Собака лает.", "The dog barks.", "17"];
        let first = choose(&values);
        for _ in 0..20 {
            assert_eq!(choose(&values), first);
        }
    }

    #[test]
    fn test_sequence_numbers_never_front() {
        let sides = choose(&["42", "der Hund", "the dog"]).unwrap();
        assert_eq!(sides.front, "der Hund");
        assert_eq!(sides.back, "the dog");
    }

    #[test]
    fn test_numeric_answer_goes_to_back() {
        let sides = choose(&["In which year did World War II end?", "1945"]).unwrap();
        assert_eq!(sides.front, "In which year did World War II end?");
        assert_eq!(sides.back, "1945");

        let sides = choose(&["42", "Answer to everything"]).unwrap();
        assert_eq!(sides.front, "Answer to everything");
        assert_eq!(sides.back, "42");
    }

    #[test]
    fn test_numbers_only_lose_to_text_on_back() {
        let sides = choose(&["Hund", "17", "dog"]).unwrap();
        assert_eq!(sides.front, "Hund");
        assert_eq!(sides.back, "dog");
    }

    #[test]
    fn test_target_script_is_front_and_label_is_demoted() {
        let sides = choose(&["letter n", "н", "[sound:n.mp3]", "3"]).unwrap();
        assert_eq!(sides.front, "н");
        assert_eq!(sides.back, "letter n");
    }

    #[test]
    fn test_vocabulary_note_keeps_examples_on_back() {
        let sides = choose(&["кот", "cat", "Кот спит на диване.", "The cat sleeps on the sofa."]).unwrap();
        assert_eq!(sides.front, "кот");
        assert!(sides.back.starts_with("cat"));
        assert!(sides.back.contains("The cat sleeps on the sofa."));
    }

    #[test]
    fn test_cloze_field_wins_front() {
        let sides = choose(&["Extra context here", "Water boils at {{c1::100}} °C"]).unwrap();
        assert_eq!(sides.front, "Water boils at [...] °C");
        assert!(sides.back.starts_with("Water boils at 100 °C"));
        assert!(sides.back.contains("Extra context here"));
    }

    #[test]
    fn test_candidate_flags() {
        let c = Candidate::new(0, "<div>[sound:x.mp3]</div>", &ExtendedScripts);
        assert!(c.audio_only);
        assert!(!c.is_display_worthy());

        let c = Candidate::new(1, " 1 2 3 ", &ExtendedScripts);
        assert!(c.digits_only);

        let c = Candidate::new(2, "letter n", &ExtendedScripts);
        assert!(c.looks_like_label);

        let c = Candidate::new(3, "Letter n, lowercase.", &ExtendedScripts);
        assert!(!c.looks_like_label);
    }

    #[test]
    fn test_label_penalty_grows_with_long_content() {
        let label = Candidate::new(0, "word type", &ExtendedScripts);
        let short = Peers { long_content: false, target_script: true };
        let long = Peers { long_content: true, target_script: true };
        assert!(front_score(&label, &long) < front_score(&label, &short));
        assert!(front_score(&label, &short) < front_score(&label, &Peers::default()));
    }

    #[test]
    fn test_length_extremes_penalized() {
        assert!(length_score(20) > length_score(1));
        assert!(length_score(20) > length_score(1000));
    }
}
