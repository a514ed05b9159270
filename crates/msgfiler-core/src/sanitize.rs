//! Filesystem-safe text.
//!
//! [`sanitize`] turns arbitrary subject text into a token that can be used as
//! part of a file name on Windows and Unix filesystems.

use std::sync::LazyLock;

use regex::Regex;

/// Characters that are not allowed in a Windows path component.
pub const RESERVED_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Any run of whitespace.
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Any run of two or more underscores.
static UNDERSCORE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("underscore regex"));

/// Multi-character sequences, replaced in order before single characters.
const SEQUENCE_REPLACEMENTS: &[(&str, &str)] = &[
    ("_-_", "-"),
    (" - ", "-"),
    ("._", "_"),
    ("_.", "_"),
    (" .", "_"),
    (". ", "_"),
    (" / ", "_"),
    (" & ", "_"),
    ("; ", "_"),
    ("/ ", "_"),
    (" | ", "_"),
];

/// Replacement for a single character, or `None` if it is kept as is.
///
/// No replacement contains a character that is itself replaced.
const fn replace_char(c: char) -> Option<&'static str> {
    let replacement = match c {
        ' ' | '#' | '%' | '&' | '/' | '|' | '\'' | ';' => "_",
        '*' | '{' | '}' | '\\' | '<' | '>' | '?' => "-",
        ':' | '"' | ',' | '!' | '\u{201C}' | '\u{201E}' => "",
        'ä' => "ae",
        'Ä' => "Ae",
        'ö' => "oe",
        'Ö' => "Oe",
        'ü' => "ue",
        'Ü' => "Ue",
        'ß' => "ss",
        'é' | 'è' => "e",
        'É' | 'È' => "E",
        _ => return None,
    };
    Some(replacement)
}

/// Text that contains no reserved filesystem character, no control character
/// and no whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SanitizedText(String);

impl SanitizedText {
    /// Returns the sanitized text as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if nothing is left after sanitizing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the wrapper and returns the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapses whitespace runs to a single space and trims both ends.
fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// One round of sequence replacement, character replacement and underscore
/// collapsing.
fn sanitize_pass(text: &str) -> String {
    let mut current = text.to_string();
    for (pattern, replacement) in SEQUENCE_REPLACEMENTS {
        if current.contains(pattern) {
            current = current.replace(pattern, replacement);
        }
    }

    let mut replaced = String::with_capacity(current.len());
    for c in current.chars() {
        match replace_char(c) {
            Some(replacement) => replaced.push_str(replacement),
            None if c.is_control() => {}
            None => replaced.push(c),
        }
    }

    UNDERSCORE_RUN.replace_all(&replaced, "_").into_owned()
}

/// Sanitizes text for use in a file name.
///
/// Whitespace is collapsed first, then multi-character sequences are
/// replaced, then single characters. Control characters are dropped. The
/// passes repeat until the text no
/// longer changes, so the result is a fixed point:
/// `sanitize(sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize(text: &str) -> SanitizedText {
    let mut current = collapse_whitespace(text);
    loop {
        let next = sanitize_pass(&current);
        // Every repeated pass only shrinks the text, so this terminates.
        if next == current {
            return SanitizedText(current);
        }
        current = next;
    }
}

/// Replaces every reserved filesystem character with `_`.
///
/// Lighter than [`sanitize`]: used for segments such as email addresses that
/// should otherwise stay untouched.
#[must_use]
pub fn replace_reserved(text: &str) -> String {
    text.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
