//! TF-IDF term-weight model.
//!
//! Projects normalized address text into a fixed sparse vector space. The
//! model is fitted once over the corpus (producing the corpus matrix as a
//! by-product) and then used read-only to project queries into the same
//! space. Rows are L2-normalized, so the dot product of two projections is
//! their cosine similarity.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use address_normalizer_matcher_models::{Analyzer, VectorizerConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::progress::ProgressCallback;
use crate::sparse::{SparseMatrix, SparseVector};

/// Word tokens of at least two word characters.
static WORD_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

/// Errors from fitting or encoding a model.
#[derive(Debug, thiserror::Error)]
pub enum VectorizerError {
    /// The configured n-gram range is empty or starts at zero.
    #[error("invalid n-gram range {min}..={max}")]
    InvalidNgramRange {
        /// Configured minimum.
        min: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Vocabulary grew past the `u32` column space.
    #[error("vocabulary too large: {0} terms")]
    VocabularyTooLarge(usize),

    /// `MessagePack` encoding failed.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// A fitted term-weight model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeightModel {
    config: VectorizerConfig,
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
}

impl TermWeightModel {
    /// Fits a model over `documents` and returns it together with the
    /// matrix of their projections, one row per document in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the n-gram range is invalid or the vocabulary
    /// does not fit in `u32` column indices.
    pub fn fit<S: AsRef<str>>(
        documents: &[S],
        config: VectorizerConfig,
        progress: &dyn ProgressCallback,
    ) -> Result<(Self, SparseMatrix), VectorizerError> {
        validate_config(config)?;

        progress.set_message("Counting terms".to_string());
        progress.set_total(documents.len() as u64);

        let mut doc_counts: Vec<HashMap<String, u32>> = Vec::with_capacity(documents.len());
        let mut document_frequency: HashMap<String, u32> = HashMap::new();

        for doc in documents {
            let counts = count_terms(&analyze(doc.as_ref(), config));
            for term in counts.keys() {
                *document_frequency.entry(term.clone()).or_default() += 1;
            }
            doc_counts.push(counts);
            progress.inc(1);
        }

        let mut terms: Vec<String> = document_frequency.keys().cloned().collect();
        terms.sort_unstable();

        if u32::try_from(terms.len()).is_err() {
            return Err(VectorizerError::VocabularyTooLarge(terms.len()));
        }

        #[allow(clippy::cast_precision_loss)]
        let n_docs = documents.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(terms.len());

        #[allow(clippy::cast_possible_truncation)]
        for (col, term) in terms.into_iter().enumerate() {
            let df = f64::from(document_frequency[&term]);
            idf.push((((1.0 + n_docs) / (1.0 + df)).ln() + 1.0) as f32);
            vocabulary.insert(term, col as u32);
        }

        let model = Self {
            config,
            vocabulary,
            idf,
        };

        log::debug!(
            "Fitted {} model: {} documents, {} terms",
            model.config.analyzer,
            documents.len(),
            model.vocabulary.len()
        );

        progress.set_message("Weighting rows".to_string());
        progress.set_position(0);

        let mut matrix = SparseMatrix::new(model.dimension());
        for counts in &doc_counts {
            matrix.push_row(&model.weigh(counts));
            progress.inc(1);
        }

        Ok((model, matrix))
    }

    /// Projects `text` into the model's vector space.
    ///
    /// Terms that are not in the vocabulary are ignored; text with no known
    /// terms produces an empty vector.
    #[must_use]
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&count_terms(&analyze(text, self.config)))
    }

    /// Number of columns in the vector space.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    /// Parameters the model was fitted with.
    #[must_use]
    pub const fn config(&self) -> VectorizerConfig {
        self.config
    }

    /// Column of `term`, if it is in the vocabulary.
    #[must_use]
    pub fn column(&self, term: &str) -> Option<u32> {
        self.vocabulary.get(term).copied()
    }

    /// Inverse document frequency of `term`, if it is in the vocabulary.
    #[must_use]
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.column(term).map(|c| self.idf[c as usize])
    }

    /// Encodes the model to `MessagePack`.
    ///
    /// The encoding is deterministic: the vocabulary is stored in sorted
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VectorizerError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Hex SHA-256 of the encoded model.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn fingerprint(&self) -> Result<String, VectorizerError> {
        Ok(fingerprint_bytes(&self.to_bytes()?))
    }

    /// Checks that the vocabulary and IDF table agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.vocabulary.len() == self.idf.len()
            && self
                .vocabulary
                .values()
                .all(|&c| (c as usize) < self.idf.len())
            && validate_config(self.config).is_ok()
    }

    #[allow(clippy::cast_precision_loss)]
    fn weigh(&self, counts: &HashMap<String, u32>) -> SparseVector {
        let pairs = counts
            .iter()
            .filter_map(|(term, &count)| {
                let col = self.column(term)?;
                let tf = if self.config.sublinear_tf {
                    1.0 + (count as f32).ln()
                } else {
                    count as f32
                };
                Some((col, tf * self.idf[col as usize]))
            })
            .collect();

        let mut vector = SparseVector::from_pairs(pairs);
        vector.l2_normalize();
        vector
    }
}

/// Hex SHA-256 of raw bytes.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn validate_config(config: VectorizerConfig) -> Result<(), VectorizerError> {
    if config.ngram_min == 0 || config.ngram_min > config.ngram_max {
        return Err(VectorizerError::InvalidNgramRange {
            min: config.ngram_min,
            max: config.ngram_max,
        });
    }
    Ok(())
}

fn count_terms(terms: &[String]) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for term in terms {
        *counts.entry(term.clone()).or_default() += 1;
    }
    counts
}

/// Splits text into terms according to the analyzer.
#[must_use]
pub fn analyze(text: &str, config: VectorizerConfig) -> Vec<String> {
    let lower = text.to_lowercase();
    match config.analyzer {
        Analyzer::CharWb => char_wb_ngrams(&lower, config.ngram_min, config.ngram_max),
        Analyzer::Char => char_ngrams(&lower, config.ngram_min, config.ngram_max),
        Analyzer::Word => word_ngrams(&lower, config.ngram_min, config.ngram_max),
    }
}

/// Character n-grams inside each space-padded word.
///
/// A word shorter than an n-gram length contributes itself (padded) once.
fn char_wb_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let mut ngrams = Vec::new();

    for word in text.split_whitespace() {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        let len = padded.len();

        for n in min_n..=max_n {
            let mut offset = 0;
            ngrams.push(padded[offset..(offset + n).min(len)].iter().collect());
            while offset + n < len {
                offset += 1;
                ngrams.push(padded[offset..offset + n].iter().collect());
            }
            if offset == 0 {
                break;
            }
        }
    }

    ngrams
}

/// Character n-grams over the whitespace-collapsed text.
fn char_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let chars: Vec<char> = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();

    let mut ngrams = Vec::new();
    for n in min_n..=max_n {
        if n > chars.len() {
            break;
        }
        for window in chars.windows(n) {
            ngrams.push(window.iter().collect());
        }
    }
    ngrams
}

/// Word n-grams over tokens of at least two word characters.
fn word_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let tokens: Vec<&str> = WORD_TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect();

    let mut ngrams = Vec::new();
    for n in min_n..=max_n {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            ngrams.push(window.join(" "));
        }
    }
    ngrams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;

    fn char_wb(min: usize, max: usize) -> VectorizerConfig {
        VectorizerConfig {
            analyzer: Analyzer::CharWb,
            ngram_min: min,
            ngram_max: max,
            sublinear_tf: false,
        }
    }

    #[test]
    fn char_wb_pads_words() {
        assert_eq!(
            analyze("ab", char_wb(2, 2)),
            vec![" a".to_string(), "ab".to_string(), "b ".to_string()]
        );
    }

    #[test]
    fn char_wb_counts_short_word_once() {
        assert_eq!(
            analyze("5", char_wb(2, 4)),
            vec![" 5".to_string(), "5 ".to_string(), " 5 ".to_string()]
        );
    }

    #[test]
    fn char_ngrams_cross_word_boundaries() {
        let config = VectorizerConfig {
            analyzer: Analyzer::Char,
            ngram_min: 3,
            ngram_max: 3,
            sublinear_tf: false,
        };
        assert_eq!(
            analyze("ab  cd", config),
            vec!["ab ".to_string(), "b c".to_string(), " cd".to_string()]
        );
    }

    #[test]
    fn word_analyzer_drops_single_characters() {
        assert_eq!(
            analyze("Ленина 5 дом 10", VectorizerConfig::words()),
            vec!["ленина".to_string(), "дом".to_string(), "10".to_string()]
        );
    }

    #[test]
    fn word_bigrams() {
        let config = VectorizerConfig {
            analyzer: Analyzer::Word,
            ngram_min: 1,
            ngram_max: 2,
            sublinear_tf: false,
        };
        assert_eq!(
            analyze("улица ленина", config),
            vec![
                "улица".to_string(),
                "ленина".to_string(),
                "улица ленина".to_string()
            ]
        );
    }

    #[test]
    fn fit_assigns_sorted_columns_and_smoothed_idf() {
        let docs = ["улица 10", "улица мира"];
        let (model, matrix) =
            TermWeightModel::fit(&docs, VectorizerConfig::words(), &NullProgress).unwrap();

        assert_eq!(model.dimension(), 3);
        assert_eq!(model.column("10"), Some(0));
        assert_eq!(model.column("мира"), Some(1));
        assert_eq!(model.column("улица"), Some(2));

        // df = 2 of 2 documents: ln(3/3) + 1
        assert!((model.idf("улица").unwrap() - 1.0).abs() < 1e-6);
        // df = 1 of 2 documents: ln(3/2) + 1
        assert!((model.idf("мира").unwrap() - (1.5f32.ln() + 1.0)).abs() < 1e-6);

        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.n_cols(), 3);
    }

    #[test]
    fn transform_produces_unit_vectors() {
        let docs = ["улица ленина дом 5", "проспект мира дом 15"];
        let (model, _) = TermWeightModel::fit(&docs, char_wb(2, 3), &NullProgress).unwrap();

        let v = model.transform("ленина 5");
        assert!(!v.is_empty());
        assert!((v.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn transform_matches_fitted_rows() {
        let docs = ["улица ленина дом 5", "проспект мира дом 15"];
        let (model, matrix) =
            TermWeightModel::fit(&docs, char_wb(2, 3), &NullProgress).unwrap();

        let projected = model.transform(docs[0]);
        let (idx, val) = matrix.row(0);
        assert_eq!(projected.indices(), idx);
        assert_eq!(projected.values(), val);
    }

    #[test]
    fn unknown_terms_produce_empty_vector() {
        let (model, _) =
            TermWeightModel::fit(&["улица ленина"], VectorizerConfig::words(), &NullProgress)
                .unwrap();
        assert!(model.transform("qwerty zzz").is_empty());
        assert!(model.transform("").is_empty());
    }

    #[test]
    fn sublinear_tf_dampens_repeats() {
        let config = VectorizerConfig {
            sublinear_tf: true,
            ..VectorizerConfig::words()
        };
        let docs = ["мира мира мира ленина", "ленина"];
        let (linear, _) =
            TermWeightModel::fit(&docs, VectorizerConfig::words(), &NullProgress).unwrap();
        let (sublinear, _) = TermWeightModel::fit(&docs, config, &NullProgress).unwrap();

        let col = linear.column("мира").unwrap();
        let weight = |v: &SparseVector| {
            v.indices()
                .iter()
                .position(|&c| c == col)
                .map(|i| v.values()[i])
                .unwrap()
        };
        assert!(weight(&sublinear.transform(docs[0])) < weight(&linear.transform(docs[0])));
    }

    #[test]
    fn rejects_invalid_ngram_range() {
        let err = TermWeightModel::fit(&["a"], char_wb(3, 2), &NullProgress).unwrap_err();
        assert!(matches!(
            err,
            VectorizerError::InvalidNgramRange { min: 3, max: 2 }
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let docs = ["улица ленина", "проспект мира"];
        let (a, _) = TermWeightModel::fit(&docs, VectorizerConfig::words(), &NullProgress).unwrap();
        let (b, _) = TermWeightModel::fit(&docs, VectorizerConfig::words(), &NullProgress).unwrap();
        let (c, _) =
            TermWeightModel::fit(&["улица ленина"], VectorizerConfig::words(), &NullProgress)
                .unwrap();

        let fa = a.fingerprint().unwrap();
        assert_eq!(fa.len(), 64);
        assert_eq!(fa, b.fingerprint().unwrap());
        assert_ne!(fa, c.fingerprint().unwrap());
        assert!(a.is_consistent());
    }
}
