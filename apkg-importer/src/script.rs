//! Script composition of field text.
//!
//! Language-learning decks often mix a Latin-script gloss with the script
//! being studied. Which characters count as the studied ("target") script is
//! decided by a [`ScriptPredicate`].

/// Fronts longer than this many whitespace tokens are never refined
const MAX_REFINE_TOKENS: usize = 6;

/// Decides whether a character belongs to the script being studied
pub trait ScriptPredicate: Send + Sync {
    fn is_target(&self, c: char) -> bool;
}

/// Non-Latin alphabets, syllabaries and CJK ideographs
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendedScripts;

impl ScriptPredicate for ExtendedScripts {
    fn is_target(&self, c: char) -> bool {
        matches!(c,
            '\u{0370}'..='\u{03FF}'   // Greek
            | '\u{0400}'..='\u{052F}' // Cyrillic + supplement
            | '\u{0530}'..='\u{058F}' // Armenian
            | '\u{0590}'..='\u{05FF}' // Hebrew
            | '\u{0600}'..='\u{06FF}' // Arabic
            | '\u{0900}'..='\u{097F}' // Devanagari
            | '\u{0E00}'..='\u{0E7F}' // Thai
            | '\u{10A0}'..='\u{10FF}' // Georgian
            | '\u{1100}'..='\u{11FF}' // Hangul Jamo
            | '\u{3040}'..='\u{30FF}' // Hiragana, Katakana
            | '\u{3130}'..='\u{318F}' // Hangul compatibility Jamo
            | '\u{3400}'..='\u{4DBF}' // CJK extension A
            | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
            | '\u{AC00}'..='\u{D7AF}' // Hangul syllables
            | '\u{FF66}'..='\u{FF9F}' // Halfwidth Katakana
        )
    }
}

/// Latin letters, including accented Latin-1 and Latin Extended-A/B
pub fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || (('\u{00C0}'..='\u{024F}').contains(&c) && c.is_alphabetic())
}

/// Letter counts by script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptProfile {
    pub target: usize,
    pub latin: usize,
}

impl ScriptProfile {
    pub fn of(text: &str, predicate: &dyn ScriptPredicate) -> Self {
        text.chars().fold(Self::default(), |mut profile, c| {
            if predicate.is_target(c) {
                profile.target += 1;
            } else if is_latin_letter(c) {
                profile.latin += 1;
            }
            profile
        })
    }

    /// Share of script letters that are target-script, 0.0 when there are none
    pub fn target_ratio(&self) -> f64 {
        let total = self.target + self.latin;
        if total == 0 {
            0.0
        } else {
            self.target as f64 / total as f64
        }
    }

    pub fn is_mixed(&self) -> bool {
        self.target > 0 && self.latin > 0
    }
}

/// Reduce a front like `letter n н` to its target-script tokens.
///
/// Returns `None` when the text is not a short Latin label followed by
/// target-script tokens, including whenever the target script already
/// holds the majority of tokens.
pub fn refine_front(front: &str, predicate: &dyn ScriptPredicate) -> Option<String> {
    let tokens: Vec<&str> = front.split_whitespace().collect();
    if tokens.len() < 2 || tokens.len() > MAX_REFINE_TOKENS {
        return None;
    }
    // Sentence punctuation means prose, not a label
    if front.contains(['.', ',', ';', '!', '?']) {
        return None;
    }

    let mut target_tokens = Vec::new();
    let mut latin_tokens = 0;
    for token in &tokens {
        if token.chars().any(|c| predicate.is_target(c)) {
            target_tokens.push(*token);
        } else if token.chars().any(is_latin_letter) {
            latin_tokens += 1;
        }
    }

    if target_tokens.is_empty() || latin_tokens == 0 {
        return None;
    }
    if target_tokens.len() * 2 >= target_tokens.len() + latin_tokens {
        return None;
    }

    Some(target_tokens.join(" "))
}
