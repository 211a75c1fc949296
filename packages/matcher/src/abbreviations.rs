//! Address-part abbreviation table.
//!
//! Maps the short forms found in hand-typed Russian addresses to the full
//! words stored in the corpus. The table is applied symmetrically when the
//! corpus is built and when a query is normalized, so "ул. Ленина, д. 5" and
//! "улица Ленина, дом 5" produce the same text.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Maps abbreviations to their canonical full form.
static ABBREVIATIONS: LazyLock<BTreeMap<&'static str, &'static str>> = LazyLock::new(|| {
    BTreeMap::from([
        ("г", "город"),
        ("ул", "улица"),
        ("д", "дом"),
        ("пр", "проспект"),
        ("к", "корпус"),
        ("корп", "корпус"),
        ("стр", "строение"),
        ("лит", "литера"),
    ])
});

/// Matches any abbreviation as a standalone word.
///
/// Longer keys come first in the alternation, although the trailing `\b`
/// already rejects a short key that is a prefix of a longer word.
static ABBREVIATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let mut keys: Vec<&str> = ABBREVIATIONS.keys().copied().collect();
    keys.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    let alternation = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).expect("valid regex")
});

/// Expands a single token if it is a known abbreviation.
///
/// Returns the original token unchanged otherwise.
#[must_use]
pub fn expand_token(token: &str) -> &str {
    ABBREVIATIONS.get(token).copied().unwrap_or(token)
}

/// Expands every standalone abbreviation in `text`.
///
/// Expects text that is already lowercased and stripped of punctuation.
/// Word boundaries are Unicode-aware, so `/` separates tokens just like
/// whitespace does (`"д/5"` becomes `"дом/5"`).
#[must_use]
pub fn expand_all(text: &str) -> Cow<'_, str> {
    ABBREVIATION_RE.replace_all(text, |caps: &Captures<'_>| expand_token(&caps[0]).to_string())
}
