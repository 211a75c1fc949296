#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the hybrid address matcher.
//!
//! This crate contains only data types, configuration structs, and simple
//! conversions. It has no heavyweight dependencies (no I/O, no regex, no
//! vector math).

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Version of the on-disk index bundle layout written by this release.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Fine-grained (stage 2) scoring method.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreMethod {
    /// Normalized InDel similarity over sorted tokens.
    #[default]
    TokenSortRatio,
    /// Normalized Levenshtein similarity over sorted tokens.
    TokenSortLevenshtein,
}

/// How text is split into terms by the term-weight model.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Analyzer {
    /// Character n-grams taken inside space-padded words.
    #[default]
    CharWb,
    /// Character n-grams over the whole whitespace-collapsed text.
    Char,
    /// Word n-grams over tokens of two or more word characters.
    Word,
}

/// Parameters used to fit a term-weight model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Term extraction strategy.
    #[serde(default)]
    pub analyzer: Analyzer,
    /// Smallest n-gram length (inclusive).
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    /// Largest n-gram length (inclusive).
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    /// Use `1 + ln(tf)` instead of raw term counts.
    #[serde(default)]
    pub sublinear_tf: bool,
}

const fn default_ngram_min() -> usize {
    2
}

const fn default_ngram_max() -> usize {
    3
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            analyzer: Analyzer::default(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            sublinear_tf: false,
        }
    }
}

impl VectorizerConfig {
    /// Word unigram configuration.
    #[must_use]
    pub const fn words() -> Self {
        Self {
            analyzer: Analyzer::Word,
            ngram_min: 1,
            ngram_max: 1,
            sublinear_tf: false,
        }
    }
}

/// Per-request matching options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Candidate pool size taken from stage 1.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Minimum stage 2 score (0-100) required to accept a candidate.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Stage 2 scoring method.
    #[serde(default)]
    pub method: ScoreMethod,
}

const fn default_k() -> usize {
    10
}

const fn default_score_threshold() -> f64 {
    50.0
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            score_threshold: default_score_threshold(),
            method: ScoreMethod::default(),
        }
    }
}

/// A canonical address record with its numeric fields converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Display address as it appears in the source data.
    pub address: String,
    /// Normalized form used for all comparisons.
    pub normalized: String,
    /// Street name.
    pub street: String,
    /// House number.
    pub housenumber: u32,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Unique record id.
    pub id: i64,
}

/// An accepted match for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// The matched record.
    pub record: AddressRecord,
    /// Stage 2 similarity score (0-100).
    pub score: f64,
    /// Method that produced `score`.
    pub method: ScoreMethod,
    /// Row of the record in the corpus.
    pub row: usize,
    /// Stage 1 similarity of the record to the query.
    pub coarse_score: f32,
}

impl MatchResult {
    /// Score text in the form `"<score> (<method>)"`.
    ///
    /// The score always carries a fractional part (`"100.0"`, `"61.5"`).
    #[must_use]
    pub fn score_label(&self) -> String {
        if self.score.fract() == 0.0 {
            format!("{:.1} ({})", self.score, self.method)
        } else {
            format!("{} ({})", self.score, self.method)
        }
    }
}

/// Metadata stored alongside an index bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Layout version of the bundle.
    pub format_version: u32,
    /// Hex SHA-256 of the encoded term-weight model.
    pub model_fingerprint: String,
    /// Number of corpus rows (and matrix rows).
    pub rows: usize,
    /// Number of matrix columns (vocabulary size).
    pub columns: usize,
    /// Parameters the model was fitted with.
    pub vectorizer: VectorizerConfig,
}

/// Statistics about a built index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Records written to the corpus.
    pub total_records: u64,
    /// Source rows that were dropped.
    pub skipped_records: u64,
    /// Number of distinct terms in the vocabulary.
    pub vocabulary_size: usize,
    /// Non-zero entries in the corpus matrix.
    pub nonzeros: usize,
    /// Bundle size on disk in bytes.
    pub index_size_bytes: u64,
    /// Time taken to build the index in seconds.
    pub build_time_secs: f64,
}
