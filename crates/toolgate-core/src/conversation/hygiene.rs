//! Text cleanup for model-emitted text blocks.
//!
//! Models occasionally echo HTML fragments, escaped JSON, or ragged
//! whitespace back at us. The scrub pass normalizes that; short clean text
//! passes through untouched.

use std::sync::OnceLock;

use regex::Regex;

/// Inputs at or under this length with no markup pass through raw.
const RAW_KEEP_THRESHOLD: usize = 256;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex is valid"))
}

fn space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\r\f]+").expect("space regex is valid"))
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("blank-line regex is valid"))
}

fn looks_clean(text: &str) -> bool {
    text.len() <= RAW_KEEP_THRESHOLD
        && !text.contains('<')
        && !text.contains('&')
        && !text.contains('\\')
}

/// Normalize a model-emitted text block.
pub fn scrub_text(raw: &str) -> String {
    if looks_clean(raw) {
        return raw.trim().to_string();
    }

    let mut text = tag_re().replace_all(raw, " ").into_owned();

    for (entity, replacement) in [
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
    ] {
        text = text.replace(entity, replacement);
    }

    // Escaped-JSON artifacts that survive double serialization.
    text = text
        .replace("\\n", "\n")
        .replace("\\t", " ")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\");

    let text = space_re().replace_all(&text, " ");
    let text = blank_lines_re().replace_all(&text, "\n\n");
    text.trim().to_string()
}
