//! Address normalization.
//!
//! Provides a deterministic normalization pipeline applied symmetrically
//! when the corpus is built and when a query arrives. This ensures that
//! "ул. Ленина, д.5" and "улица ленина дом 5" produce the same text.

use regex::Regex;
use std::sync::LazyLock;

use crate::abbreviations;

/// Matches every character that is not a lowercase Cyrillic or Latin
/// letter, an ASCII digit, whitespace, or `/`.
static NON_ADDRESS_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^а-яa-z0-9\s/]").expect("valid regex"));

/// Normalizes a raw address string.
///
/// The pipeline:
/// 1. Lowercase, fold `ё` onto `е`
/// 2. Replace each disallowed character with a space
/// 3. Expand abbreviations (ул→улица, д→дом, etc.)
/// 4. Collapse whitespace and trim
///
/// Never fails. Input without letters or digits yields an empty string.
#[must_use]
pub fn normalize(input: &str) -> String {
    let lower = input.to_lowercase().replace('ё', "е");
    let stripped = NON_ADDRESS_CHAR_RE.replace_all(&lower, " ");
    let expanded = abbreviations::expand_all(&stripped);

    expanded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns `true` if `text` is already in normalized form.
#[must_use]
pub fn is_normalized(text: &str) -> bool {
    normalize(text) == text
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn expands_abbreviations() {
        assert_eq!(normalize("ул. Ленина, д.5"), "улица ленина дом 5");
    }

    #[test]
    fn abbreviated_and_full_forms_agree() {
        assert_eq!(normalize("ул. Ленина, д.5"), normalize("улица ленина дом 5"));
        assert_eq!(
            normalize("г. Москва, пр. Мира, д. 15, корп. 2"),
            "город москва проспект мира дом 15 корпус 2"
        );
    }

    #[test]
    fn replaces_each_punctuation_char_with_space() {
        assert_eq!(normalize("д.10,"), "дом 10");
        assert_eq!(normalize("Тверская,10"), "тверская 10");
    }

    #[test]
    fn folds_yo() {
        assert_eq!(normalize("Ёлочная ул"), "елочная улица");
        assert_eq!(normalize("Щёлковское"), "щелковское");
    }

    #[test]
    fn keeps_slash_and_latin() {
        assert_eq!(normalize("Kutuzovsky 2/1 стр.6"), "kutuzovsky 2/1 строение 6");
    }

    #[test]
    fn hyphenated_avenue_splits() {
        assert_eq!(normalize("пр-т Мира"), "проспект т мира");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  ленина \t\n  5  "), "ленина 5");
    }

    #[test]
    fn empty_and_noise_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!!!---"), "");
        assert_eq!(normalize(" ,.;:"), "");
    }

    #[test]
    fn detects_normalized_text() {
        assert!(is_normalized("улица ленина дом 5"));
        assert!(!is_normalized("ул ленина"));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[а-яА-ЯёЁa-zA-Z0-9 .,;/\\-\t№]{0,48}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn normalize_is_idempotent_for_any_text(s in "\\PC{0,32}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn output_uses_allowed_characters_only(s in "\\PC{0,48}") {
            let out = normalize(&s);
            let allowed = out.chars().all(|c| {
                ('а'..='я').contains(&c)
                    || c.is_ascii_lowercase()
                    || c.is_ascii_digit()
                    || c == ' '
                    || c == '/'
            });
            prop_assert!(allowed, "unexpected character in {:?}", out);
            prop_assert!(!out.contains("  "));
            prop_assert_eq!(out.trim(), out.as_str());
        }
    }
}
