use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::media::MediaUrlMap;

/// `[sound:filename.mp3]`
pub(crate) static SOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[sound:([^\]]+)\]").unwrap());

/// `<img src="...">` with double, single or no quotes around the source
pub(crate) static IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))[^>]*>"#)
        .unwrap()
});

static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(?:div|p|li|tr|h[1-6])>").unwrap());
static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<li[^>]*>").unwrap());
/// Tag-shaped tokens only, so bare `<` and `>` in prose survive
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)</?[A-Za-z!][^>]*>").unwrap());
static MULTI_NEWLINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Source filename of an `<img>` match, entity-decoded
pub(crate) fn img_source(caps: &Captures) -> String {
    let raw = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map_or("", |m| m.as_str());
    html_escape::decode_html_entities(raw.trim()).into_owned()
}

/// Replace media references whose filename has a resolved URL.
///
/// - `[sound:file.mp3]` → `[🔊 file.mp3](url)`
/// - `<img src="file.jpg">` → `![file.jpg](url)`
///
/// References to filenames missing from `urls` are left exactly as they are.
pub fn rewrite_media_references(text: &str, urls: &MediaUrlMap) -> String {
    if urls.is_empty() {
        return text.to_string();
    }

    let text = SOUND_RE.replace_all(text, |caps: &Captures| {
        let filename = caps[1].trim();
        match urls.get(filename) {
            Some(url) => format!("[🔊 {filename}]({url})"),
            None => caps[0].to_string(),
        }
    });

    IMG_RE
        .replace_all(&text, |caps: &Captures| {
            let filename = img_source(caps);
            match urls.get(&filename) {
                Some(url) => format!("![{filename}]({url})"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Convert HTML field content to plain text with Markdown media links
///
/// This handles:
/// - unresolved `<img src="file.jpg">` → `![file.jpg](media:file.jpg)`
/// - `<br>`, closing `div`/`p`/`li` → newline; `<li>` → `- `
/// - every other tag → removed
/// - HTML entities → decoded
/// - three or more newlines → one blank line
///
/// Sound markers are not tags and pass through.
pub fn clean_html(html: &str) -> String {
    let text = html.replace("\r\n", "\n");

    let text = IMG_RE.replace_all(&text, |caps: &Captures| {
        let filename = img_source(caps);
        format!("![{filename}](media:{filename})")
    });

    let text = BR_RE.replace_all(&text, "\n");
    let text = BLOCK_CLOSE_RE.replace_all(&text, "\n");
    let text = LIST_ITEM_RE.replace_all(&text, "- ");
    let text = TAG_RE.replace_all(&text, "");

    let text = html_escape::decode_html_entities(&text).replace('\u{a0}', " ");

    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    MULTI_NEWLINE_RE
        .replace_all(text.trim(), "\n\n")
        .into_owned()
}

/// Text a reader would see, without sound markers or markup
pub fn visible_text(html: &str) -> String {
    let without_sound = SOUND_RE.replace_all(html, "");
    let without_img = IMG_RE.replace_all(&without_sound, "");
    clean_html(&without_img)
}

/// True when the field holds at least one sound marker and nothing else visible
pub fn is_audio_only(html: &str) -> bool {
    SOUND_RE.is_match(html) && visible_text(html).is_empty()
}

/// True when the field shows something other than audio
pub fn is_display_worthy(html: &str) -> bool {
    !visible_text(html).is_empty() || IMG_RE.is_match(html)
}
