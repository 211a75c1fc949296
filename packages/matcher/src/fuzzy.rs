//! Token-order-insensitive string similarity.
//!
//! Both inputs are split on whitespace, their tokens sorted independently
//! and rejoined with single spaces before comparison, so
//! "улица ленина дом 5" and "дом 5 улица ленина" score identically.
//! Scores are in the range `0.0..=100.0`.

/// Sorts the whitespace-separated tokens of `text` and rejoins them with
/// single spaces.
#[must_use]
pub fn sort_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Normalized InDel similarity of two strings, `0.0..=100.0`.
///
/// Computed as `100 * 2 * lcs / (len(a) + len(b))` over characters, where
/// `lcs` is the length of the longest common subsequence. Two empty strings
/// are identical and score `100.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }

    let lcs = lcs_len(&a, &b);

    100.0 * (2 * lcs) as f64 / total as f64
}

/// InDel ratio of the token-sorted forms of `a` and `b`.
#[must_use]
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sort_tokens(a), &sort_tokens(b))
}

/// Normalized Levenshtein similarity of the token-sorted forms of `a` and
/// `b`, scaled to `0.0..=100.0`.
#[must_use]
pub fn token_sort_levenshtein(a: &str, b: &str) -> f64 {
    100.0 * strsim::normalized_levenshtein(&sort_tokens(a), &sort_tokens(b))
}

/// Longest common subsequence length using a single rolling row.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0;
    }

    let mut row = vec![0usize; short.len() + 1];

    for lc in long {
        let mut diagonal = 0;
        for (j, sc) in short.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if lc == sc {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }

    row[short.len()]
}
