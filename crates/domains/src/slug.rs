//! Title → URL token normalization.

use deunicode::deunicode_char;

pub const MAX_SLUG_LEN: usize = 255;

/// Turns a display title into a URL-safe token: non-ASCII letters are
/// transliterated, everything is lowercased, `[a-z0-9_]` is kept and every
/// other run of characters collapses into a single `-`. Leading and trailing
/// separators are trimmed. May return an empty string.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for ch in title.chars() {
        let ascii = if ch.is_ascii() {
            ch.to_string()
        } else {
            deunicode_char(ch).unwrap_or("").to_string()
        };
        for c in ascii.chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                if pending_separator && !slug.is_empty() {
                    slug.push('-');
                }
                pending_separator = false;
                slug.push(c);
            } else {
                pending_separator = true;
            }
        }
    }

    let trimmed = slug.trim_matches(|c| c == '-' || c == '_');
    truncate(trimmed, MAX_SLUG_LEN)
        .trim_end_matches('-')
        .to_string()
}

/// Joins `base` and `suffix` with `-`, shortening `base` so the result fits
/// in [`MAX_SLUG_LEN`].
pub fn with_suffix(base: &str, suffix: &str) -> String {
    let room = MAX_SLUG_LEN.saturating_sub(suffix.len() + 1);
    let base = truncate(base, room).trim_end_matches('-');
    if base.is_empty() {
        suffix.to_string()
    } else {
        format!("{base}-{suffix}")
    }
}

/// Slugs are ASCII, so byte truncation never splits a character.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        &s[..max]
    }
}
