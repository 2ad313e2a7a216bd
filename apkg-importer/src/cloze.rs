use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Placeholder shown in place of a hidden answer
pub const CLOZE_PLACEHOLDER: &str = "[...]";

/// `{{c1::answer}}` or `{{c1::answer::hint}}`
static CLOZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{c\d+::(.*?)(?:::(.*?))?\}\}").unwrap());

pub fn has_cloze(text: &str) -> bool {
    CLOZE_RE.is_match(text)
}

/// Question side: every deletion becomes `[...]`, or `[hint]` when a hint is given
pub fn mask(text: &str) -> String {
    CLOZE_RE
        .replace_all(text, |caps: &Captures| match caps.get(2) {
            Some(hint) if !hint.as_str().trim().is_empty() => format!("[{}]", hint.as_str().trim()),
            _ => CLOZE_PLACEHOLDER.to_string(),
        })
        .into_owned()
}

/// Answer side: every deletion is replaced by its answer text
pub fn reveal(text: &str) -> String {
    CLOZE_RE
        .replace_all(text, |caps: &Captures| caps[1].to_string())
        .into_owned()
}

/// Masked question and unmasked answer for a text holding cloze markers
pub fn split(text: &str) -> (String, String) {
    (mask(text), reveal(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_deletion() {
        let (front, back) = split("The sky is {{c1::blue}}");
        assert_eq!(front, "The sky is [...]");
        assert_eq!(back, "The sky is blue");
    }

    #[test]
    fn test_hints_and_multiple_deletions() {
        let text = "Capital {{c1::Tokyo}} and {{c2::Kyoto::old capital}}";
        assert!(has_cloze(text));
        assert_eq!(mask(text), "Capital [...] and [old capital]");
        assert_eq!(reveal(text), "Capital Tokyo and Kyoto");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert!(!has_cloze("{{Front}} and {c1::x}"));
        assert_eq!(mask("no deletions"), "no deletions");
    }
}
