//! Two-stage ranking.
//!
//! Stage 1 ([`CoarseScorer`]) shortlists corpus rows by vector similarity.
//! Stage 2 ([`FineScorer`]) rescores the shortlist with a fuzzy string
//! similarity, and [`decide`] applies the acceptance threshold.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use address_normalizer_matcher_models::ScoreMethod;

use crate::corpus::CorpusEntry;
use crate::fuzzy;
use crate::sparse::SparseMatrix;
use crate::vectorizer::TermWeightModel;

/// A corpus row shortlisted by stage 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Corpus row.
    pub row: usize,
    /// Stage 1 similarity.
    pub coarse_score: f32,
}

/// The best stage 2 candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    /// The shortlisted candidate.
    pub candidate: Candidate,
    /// Stage 2 similarity (0-100).
    pub score: f64,
}

/// Stage 1: selects up to `k` candidate rows for a normalized query.
pub trait CoarseScorer: Send + Sync {
    /// Returns at most `k` candidates with nonzero similarity, best first.
    /// Equal scores keep corpus row order.
    fn candidates(&self, normalized_query: &str, k: usize) -> Vec<Candidate>;
}

/// Stage 2: scores a normalized query against a candidate's normalized
/// text.
pub trait FineScorer: Send + Sync {
    /// Similarity in `0.0..=100.0`.
    fn score(&self, query: &str, candidate: &str) -> f64;

    /// Method tag reported with accepted matches.
    fn method(&self) -> ScoreMethod;
}

/// Cosine similarity against the TF-IDF corpus matrix.
pub struct TfIdfRetriever<'a> {
    model: &'a TermWeightModel,
    matrix: &'a SparseMatrix,
}

impl<'a> TfIdfRetriever<'a> {
    /// Creates a retriever over a fitted model and its corpus matrix.
    #[must_use]
    pub const fn new(model: &'a TermWeightModel, matrix: &'a SparseMatrix) -> Self {
        Self { model, matrix }
    }
}

impl CoarseScorer for TfIdfRetriever<'_> {
    fn candidates(&self, normalized_query: &str, k: usize) -> Vec<Candidate> {
        let query = self.model.transform(normalized_query);
        if k == 0 || query.is_empty() {
            return Vec::new();
        }

        let scores = self.matrix.dot_all(&query);
        top_k(&scores, k)
    }
}

/// Heap entry ordered so that a better candidate compares greater: higher
/// score first, then lower row.
#[derive(Debug, Clone, Copy)]
struct Ranked(Candidate);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .coarse_score
            .total_cmp(&other.0.coarse_score)
            .then_with(|| other.0.row.cmp(&self.0.row))
    }
}

/// Picks the `k` highest nonzero scores, ordered by score descending and
/// then by row ascending.
#[must_use]
pub fn top_k(scores: &[f32], k: usize) -> Vec<Candidate> {
    if k == 0 {
        return Vec::new();
    }

    // Min-heap of the best k seen so far; the root is the weakest.
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(k.min(scores.len()) + 1);
    for (row, &coarse_score) in scores.iter().enumerate() {
        if coarse_score <= 0.0 {
            continue;
        }
        heap.push(Reverse(Ranked(Candidate { row, coarse_score })));
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut ranked: Vec<Ranked> = heap.into_iter().map(|Reverse(r)| r).collect();
    ranked.sort_unstable_by(|a, b| b.cmp(a));
    ranked.into_iter().map(|Ranked(c)| c).collect()
}

/// Normalized InDel similarity over sorted tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSortRatio;

impl FineScorer for TokenSortRatio {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        fuzzy::token_sort_ratio(query, candidate)
    }

    fn method(&self) -> ScoreMethod {
        ScoreMethod::TokenSortRatio
    }
}

/// Normalized Levenshtein similarity over sorted tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSortLevenshtein;

impl FineScorer for TokenSortLevenshtein {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        fuzzy::token_sort_levenshtein(query, candidate)
    }

    fn method(&self) -> ScoreMethod {
        ScoreMethod::TokenSortLevenshtein
    }
}

/// Returns the fine scorer implementing `method`.
#[must_use]
pub fn fine_scorer_for(method: ScoreMethod) -> &'static dyn FineScorer {
    match method {
        ScoreMethod::TokenSortRatio => &TokenSortRatio,
        ScoreMethod::TokenSortLevenshtein => &TokenSortLevenshtein,
    }
}

/// Rescores candidates and returns the best one.
///
/// Candidates are visited in the given order and only a strictly higher
/// score replaces the current best, so ties go to the earlier candidate.
/// A candidate scoring zero is never selected.
#[must_use]
pub fn rerank(
    normalized_query: &str,
    candidates: &[Candidate],
    corpus: &[CorpusEntry],
    scorer: &dyn FineScorer,
) -> Option<Scored> {
    let mut best: Option<Scored> = None;

    for &candidate in candidates {
        let Some(entry) = corpus.get(candidate.row) else {
            log::warn!("Candidate row {} is outside the corpus", candidate.row);
            continue;
        };

        let score = scorer.score(normalized_query, &entry.normalized);
        log::trace!(
            "  row {} coarse={:.4} fine={score:.2} '{}'",
            candidate.row,
            candidate.coarse_score,
            entry.normalized
        );

        if score > best.map_or(0.0, |b| b.score) {
            best = Some(Scored { candidate, score });
        }
    }

    best
}

/// Accepts the best candidate if it reaches `score_threshold`.
#[must_use]
pub fn decide(best: Option<Scored>, score_threshold: f64) -> Option<Scored> {
    best.filter(|b| b.score >= score_threshold)
}
