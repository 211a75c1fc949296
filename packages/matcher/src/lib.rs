#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hybrid address matcher.
//!
//! Resolves free-form Russian street addresses against a reference corpus
//! of canonical address records.
//!
//! # Architecture
//!
//! - **Build time**: Source addresses are normalized (lowercased,
//!   punctuation stripped, abbreviations expanded) and a TF-IDF
//!   term-weight model is fitted over them. The model, the corpus matrix
//!   and the corpus table are saved as an on-disk bundle.
//! - **Query time**: The query is normalized identically and projected
//!   into the same vector space. The `k` most similar corpus rows are
//!   shortlisted (stage 1), rescored with a token-order-insensitive fuzzy
//!   similarity (stage 2), and the best one is accepted if it reaches the
//!   score threshold.
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use address_normalizer_matcher::{AddressIndex, MatchConfig};
//!
//! let index = AddressIndex::open("data/index")?;
//! if let Some(found) = index.resolve("ул. Арбат, д. 5", &MatchConfig::default())? {
//!     println!("{} ({})", found.record.address, found.score_label());
//! }
//! # Ok(())
//! # }
//! ```

pub mod abbreviations;
pub mod bundle;
pub mod corpus;
pub mod fuzzy;
pub mod normalize;
pub mod progress;
pub mod rank;
pub mod sparse;
pub mod vectorizer;
pub mod verify;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

pub use address_normalizer_matcher_models::{
    AddressRecord, Analyzer, IndexManifest, IndexStats, MatchConfig, MatchResult, ScoreMethod,
    VectorizerConfig,
};
use corpus::{CorpusEntry, CorpusError};
use progress::ProgressCallback;
use rank::{CoarseScorer, FineScorer, TfIdfRetriever};
use sparse::SparseMatrix;
use vectorizer::{TermWeightModel, VectorizerError};

/// Default index directory name under `data/`.
pub const DEFAULT_INDEX_DIR_NAME: &str = "index";

/// Returns the workspace `data/` directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
#[must_use]
pub fn data_dir() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .unwrap_or(manifest_dir)
        .join("data")
}

/// Returns the default path for the index bundle.
#[must_use]
pub fn default_index_dir() -> PathBuf {
    data_dir().join(DEFAULT_INDEX_DIR_NAME)
}

/// Errors from matcher operations.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    /// A matched record has a field that does not convert to an integer.
    #[error("Corpus integrity fault at row {row}: {field} = {value:?} is not an integer")]
    CorpusIntegrity {
        /// Corpus row of the record.
        row: usize,
        /// Name of the offending field.
        field: &'static str,
        /// Stored text of the field.
        value: String,
    },

    /// Model and matrix were not built together.
    #[error("Stale index: expected model fingerprint {expected}, found {actual}")]
    StaleIndex {
        /// Fingerprint recorded in the manifest.
        expected: String,
        /// Fingerprint actually found.
        actual: String,
    },

    /// Matrix and corpus disagree on the number of rows.
    #[error("Matrix has {matrix_rows} rows but corpus has {corpus_rows}")]
    RowCountMismatch {
        /// Rows in the matrix (or recorded in the manifest).
        matrix_rows: usize,
        /// Rows in the corpus table.
        corpus_rows: usize,
    },

    /// Matrix columns do not match the model vocabulary.
    #[error("Matrix has {matrix_cols} columns but vocabulary has {vocabulary} terms")]
    DimensionMismatch {
        /// Columns in the matrix.
        matrix_cols: usize,
        /// Terms in the model vocabulary.
        vocabulary: usize,
    },

    /// Bundle written by an incompatible release.
    #[error("Unsupported index format version {found} (supported: {supported})")]
    UnsupportedFormat {
        /// Version found in the manifest.
        found: u32,
        /// Version this release reads.
        supported: u32,
    },

    /// Index directory not found.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Corpus table error.
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    /// Term-weight model error.
    #[error("Vectorizer error: {0}")]
    Vectorizer(#[from] VectorizerError),

    /// `MessagePack` encoding error.
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// `MessagePack` decoding error.
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Manifest encoding or parsing error.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Async task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

/// A loaded corpus with its term-weight model and matrix.
///
/// Immutable once constructed; share it behind an [`Arc`] (see
/// [`SharedIndex`]) to serve concurrent queries.
#[derive(Debug)]
pub struct AddressIndex {
    manifest: IndexManifest,
    model: TermWeightModel,
    matrix: SparseMatrix,
    corpus: Vec<CorpusEntry>,
}

impl AddressIndex {
    /// Assembles an index from a fitted model, its matrix and the corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix does not have one row per corpus
    /// entry and one column per vocabulary term, or if the model cannot be
    /// fingerprinted.
    pub fn from_parts(
        model: TermWeightModel,
        matrix: SparseMatrix,
        corpus: Vec<CorpusEntry>,
    ) -> Result<Self, MatcherError> {
        let manifest = IndexManifest {
            format_version: address_normalizer_matcher_models::INDEX_FORMAT_VERSION,
            model_fingerprint: model.fingerprint()?,
            rows: matrix.n_rows(),
            columns: matrix.n_cols(),
            vectorizer: model.config(),
        };
        Self::assemble(manifest, model, matrix, corpus)
    }

    fn assemble(
        manifest: IndexManifest,
        model: TermWeightModel,
        matrix: SparseMatrix,
        corpus: Vec<CorpusEntry>,
    ) -> Result<Self, MatcherError> {
        if matrix.n_rows() != corpus.len() {
            return Err(MatcherError::RowCountMismatch {
                matrix_rows: matrix.n_rows(),
                corpus_rows: corpus.len(),
            });
        }

        if matrix.n_cols() != model.dimension() {
            return Err(MatcherError::DimensionMismatch {
                matrix_cols: matrix.n_cols(),
                vocabulary: model.dimension(),
            });
        }

        Ok(Self {
            manifest,
            model,
            matrix,
            corpus,
        })
    }

    /// Fits a term-weight model over `corpus` and assembles an index.
    ///
    /// # Errors
    ///
    /// Returns an error if the vectorizer configuration is invalid.
    pub fn build(
        corpus: Vec<CorpusEntry>,
        config: VectorizerConfig,
        progress: &dyn ProgressCallback,
    ) -> Result<Self, MatcherError> {
        let docs: Vec<&str> = corpus.iter().map(|e| e.normalized.as_str()).collect();
        let (model, matrix) = TermWeightModel::fit(&docs, config, progress)?;
        Self::from_parts(model, matrix, corpus)
    }

    /// Opens an index bundle from a directory.
    ///
    /// The bundle must have been written by [`AddressIndex::save`] or
    /// [`build_index`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle is missing, unreadable, stale, or
    /// its parts disagree in shape.
    pub fn open(index_dir: impl AsRef<Path>) -> Result<Self, MatcherError> {
        let index_dir = index_dir.as_ref();
        log::info!("Opening address index at {}", index_dir.display());

        let bundle = bundle::load(index_dir)?;
        let index = Self::assemble(bundle.manifest, bundle.model, bundle.matrix, bundle.corpus)?;

        log::info!(
            "Loaded {} records, {} terms",
            index.len(),
            index.model.dimension()
        );
        Ok(index)
    }

    /// Writes the index as a bundle into `index_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle cannot be written.
    pub fn save(&self, index_dir: impl AsRef<Path>) -> Result<IndexManifest, MatcherError> {
        bundle::save(index_dir.as_ref(), &self.model, &self.matrix, &self.corpus)
    }

    /// Resolves a raw address using TF-IDF retrieval and the fine scorer
    /// selected by `config.method`.
    ///
    /// Returns `Ok(None)` when nothing reaches the score threshold.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::CorpusIntegrity`] if the accepted record
    /// has a non-integer `housenumber` or `id`.
    pub fn resolve(
        &self,
        raw: &str,
        config: &MatchConfig,
    ) -> Result<Option<MatchResult>, MatcherError> {
        let retriever = TfIdfRetriever::new(&self.model, &self.matrix);
        self.resolve_with(
            raw,
            config.k,
            config.score_threshold,
            &retriever,
            rank::fine_scorer_for(config.method),
        )
    }

    /// Resolves a raw address with explicit stage 1 and stage 2 scorers.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::CorpusIntegrity`] if the accepted record
    /// has a non-integer `housenumber` or `id`.
    pub fn resolve_with(
        &self,
        raw: &str,
        k: usize,
        score_threshold: f64,
        coarse: &dyn CoarseScorer,
        fine: &dyn FineScorer,
    ) -> Result<Option<MatchResult>, MatcherError> {
        let query = normalize::normalize(raw);
        if query.is_empty() {
            log::debug!("Query {raw:?} normalized to nothing");
            return Ok(None);
        }

        let candidates = coarse.candidates(&query, k);
        log::debug!("Query {query:?}: {} candidates", candidates.len());

        let best = rank::rerank(&query, &candidates, &self.corpus, fine);
        let Some(accepted) = rank::decide(best, score_threshold) else {
            log::debug!(
                "Query {query:?}: best score {:?} below threshold {score_threshold}",
                best.map(|b| b.score)
            );
            return Ok(None);
        };

        let row = accepted.candidate.row;
        let record = self.corpus[row].to_record(row)?;

        Ok(Some(MatchResult {
            record,
            score: accepted.score,
            method: fine.method(),
            row,
            coarse_score: accepted.candidate.coarse_score,
        }))
    }

    /// Number of corpus records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    /// Returns `true` if the corpus has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Corpus entry at `row`.
    #[must_use]
    pub fn entry(&self, row: usize) -> Option<&CorpusEntry> {
        self.corpus.get(row)
    }

    /// Bundle manifest describing this index.
    #[must_use]
    pub const fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// The fitted term-weight model.
    #[must_use]
    pub const fn model(&self) -> &TermWeightModel {
        &self.model
    }

    /// The corpus matrix.
    #[must_use]
    pub const fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }
}

/// A hot-swappable handle to the current index.
///
/// Readers take an [`Arc`] snapshot and keep using it for the whole
/// request; [`SharedIndex::replace`] swaps the pointer without waiting for
/// them.
#[derive(Debug)]
pub struct SharedIndex {
    current: RwLock<Arc<AddressIndex>>,
}

impl SharedIndex {
    /// Wraps an index.
    #[must_use]
    pub fn new(index: AddressIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// Returns the current index.
    #[must_use]
    pub fn snapshot(&self) -> Arc<AddressIndex> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the current index and returns the previous one.
    pub fn replace(&self, index: AddressIndex) -> Arc<AddressIndex> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

/// Builds an index bundle from a source table.
///
/// This is the main entry point for index construction. It:
/// 1. Reads and normalizes the source CSV
/// 2. Fits the term-weight model and computes the corpus matrix
/// 3. Replaces any existing bundle in `index_dir`
///
/// # Errors
///
/// Returns an error if the source cannot be read or the bundle cannot be
/// written.
pub async fn build_index(
    source_csv: &Path,
    index_dir: &Path,
    config: VectorizerConfig,
    progress: Arc<dyn ProgressCallback>,
) -> Result<IndexStats, MatcherError> {
    let source_csv = source_csv.to_path_buf();
    let index_dir = index_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        build_index_sync(&source_csv, &index_dir, config, progress.as_ref())
    })
    .await?
}

/// Synchronous index build.
///
/// # Errors
///
/// Returns an error if the source cannot be read or the bundle cannot be
/// written.
pub fn build_index_sync(
    source_csv: &Path,
    index_dir: &Path,
    config: VectorizerConfig,
    progress: &dyn ProgressCallback,
) -> Result<IndexStats, MatcherError> {
    let start = Instant::now();

    log::info!("Reading source addresses from {}", source_csv.display());
    let loaded = corpus::read_source_csv(source_csv, progress)?;
    if loaded.skipped > 0 {
        log::warn!("  skipped {} unusable rows", loaded.skipped);
    }

    let total_records = loaded.entries.len() as u64;
    log::info!(
        "Fitting {} model over {total_records} records (n-grams {}..={})",
        config.analyzer,
        config.ngram_min,
        config.ngram_max
    );
    let index = AddressIndex::build(loaded.entries, config, progress)?;

    if index_dir.exists() {
        log::info!("Replacing existing index at {}", index_dir.display());
    }
    progress.set_message("Writing bundle".to_string());
    index.save(index_dir)?;

    let elapsed = start.elapsed();
    let index_size_bytes = bundle::dir_size(index_dir);

    #[allow(clippy::cast_precision_loss)]
    let mb = index_size_bytes as f64 / 1_048_576.0;
    log::info!(
        "Index built: {total_records} records, {} terms, {mb:.1} MB, {:.1}s",
        index.model.dimension(),
        elapsed.as_secs_f64()
    );
    progress.finish(format!("Indexed {total_records} records"));

    Ok(IndexStats {
        total_records,
        skipped_records: loaded.skipped,
        vocabulary_size: index.model.dimension(),
        nonzeros: index.matrix.nnz(),
        index_size_bytes,
        build_time_secs: elapsed.as_secs_f64(),
    })
}
