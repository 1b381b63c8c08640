//! Canonical text normalization. Every comparison in the engine goes through
//! [`normalize`]; ad-hoc lowercasing is not a substitute and must not be used
//! for matching.

use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip diacritics (NFD decompose, drop combining marks), trim.
/// Pure and total: empty input yields an empty string.
pub fn normalize(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}
