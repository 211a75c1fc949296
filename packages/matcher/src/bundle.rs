//! On-disk index bundle.
//!
//! A bundle is a directory holding everything needed to answer queries:
//!
//! | File | Contents |
//! |---|---|
//! | `manifest.toml` | [`IndexManifest`]: layout version, model fingerprint, shape |
//! | `model.msgpack` | the fitted [`TermWeightModel`] |
//! | `matrix.msgpack` | the corpus matrix and the fingerprint of its model |
//! | `corpus.csv` | the corpus table in matrix row order |
//!
//! Each file is written to a temporary name and renamed into place so an
//! interrupted save never leaves a half-written file under its final name.
//! The model fingerprint is recorded twice (manifest and matrix file) so a
//! model or matrix replaced on its own is detected on open.

use std::path::Path;

use address_normalizer_matcher_models::{INDEX_FORMAT_VERSION, IndexManifest};
use serde::{Deserialize, Serialize};

use crate::MatcherError;
use crate::corpus::{self, CorpusEntry};
use crate::sparse::SparseMatrix;
use crate::vectorizer::{TermWeightModel, fingerprint_bytes};

/// Manifest file name.
pub const MANIFEST_FILE: &str = "manifest.toml";
/// Model file name.
pub const MODEL_FILE: &str = "model.msgpack";
/// Matrix file name.
pub const MATRIX_FILE: &str = "matrix.msgpack";
/// Corpus file name.
pub const CORPUS_FILE: &str = "corpus.csv";

/// Contents of `matrix.msgpack`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMatrix {
    model_fingerprint: String,
    matrix: SparseMatrix,
}

/// The decoded parts of a bundle.
#[derive(Debug)]
pub struct Bundle {
    /// Parsed manifest.
    pub manifest: IndexManifest,
    /// Term-weight model.
    pub model: TermWeightModel,
    /// Corpus matrix.
    pub matrix: SparseMatrix,
    /// Corpus table.
    pub corpus: Vec<CorpusEntry>,
}

/// Returns `true` if `dir` looks like a bundle.
#[must_use]
pub fn exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// Writes a bundle into `dir`, creating it if needed.
///
/// Existing bundle files are replaced.
///
/// # Errors
///
/// Returns an error if encoding fails or a file cannot be written.
pub fn save(
    dir: &Path,
    model: &TermWeightModel,
    matrix: &SparseMatrix,
    corpus: &[CorpusEntry],
) -> Result<IndexManifest, MatcherError> {
    std::fs::create_dir_all(dir)?;

    let model_bytes = model.to_bytes()?;
    let model_fingerprint = fingerprint_bytes(&model_bytes);

    let manifest = IndexManifest {
        format_version: INDEX_FORMAT_VERSION,
        model_fingerprint: model_fingerprint.clone(),
        rows: matrix.n_rows(),
        columns: matrix.n_cols(),
        vectorizer: model.config(),
    };

    let stored = StoredMatrix {
        model_fingerprint,
        matrix: matrix.clone(),
    };
    let matrix_bytes = rmp_serde::to_vec(&stored)?;

    let mut corpus_bytes = Vec::new();
    corpus::write_corpus(&mut corpus_bytes, corpus, CORPUS_FILE)?;

    let manifest_text = toml::to_string_pretty(&manifest)
        .map_err(|e| MatcherError::Manifest(format!("Failed to encode manifest: {e}")))?;

    write_atomic(&dir.join(MODEL_FILE), &model_bytes)?;
    write_atomic(&dir.join(MATRIX_FILE), &matrix_bytes)?;
    write_atomic(&dir.join(CORPUS_FILE), &corpus_bytes)?;
    // Manifest last: a bundle without one is not considered present.
    write_atomic(&dir.join(MANIFEST_FILE), manifest_text.as_bytes())?;

    log::info!(
        "Saved index bundle to {} ({} rows, {} columns)",
        dir.display(),
        manifest.rows,
        manifest.columns
    );

    Ok(manifest)
}

/// Reads and verifies a bundle from `dir`.
///
/// # Errors
///
/// Returns [`MatcherError::IndexNotFound`] if `dir` has no manifest,
/// [`MatcherError::UnsupportedFormat`] for an unknown layout version, and
/// [`MatcherError::StaleIndex`] if the model does not match the
/// fingerprint recorded by the manifest or the matrix.
pub fn load(dir: &Path) -> Result<Bundle, MatcherError> {
    if !exists(dir) {
        return Err(MatcherError::IndexNotFound(dir.display().to_string()));
    }

    let manifest_text = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
    let manifest: IndexManifest = toml::from_str(&manifest_text)
        .map_err(|e| MatcherError::Manifest(format!("Failed to parse {MANIFEST_FILE}: {e}")))?;

    if manifest.format_version != INDEX_FORMAT_VERSION {
        return Err(MatcherError::UnsupportedFormat {
            found: manifest.format_version,
            supported: INDEX_FORMAT_VERSION,
        });
    }

    let model_bytes = std::fs::read(dir.join(MODEL_FILE))?;
    let actual = fingerprint_bytes(&model_bytes);
    if actual != manifest.model_fingerprint {
        return Err(MatcherError::StaleIndex {
            expected: manifest.model_fingerprint,
            actual,
        });
    }
    let model: TermWeightModel = rmp_serde::from_slice(&model_bytes)?;
    if !model.is_consistent() {
        return Err(MatcherError::Other(format!(
            "{MODEL_FILE} has inconsistent vocabulary"
        )));
    }

    let stored: StoredMatrix = rmp_serde::from_slice(&std::fs::read(dir.join(MATRIX_FILE))?)?;
    if stored.model_fingerprint != manifest.model_fingerprint {
        return Err(MatcherError::StaleIndex {
            expected: manifest.model_fingerprint,
            actual: stored.model_fingerprint,
        });
    }
    if let Some(problem) = stored.matrix.validate() {
        return Err(MatcherError::Other(format!("{MATRIX_FILE}: {problem}")));
    }

    let corpus = corpus::read_corpus_csv(&dir.join(CORPUS_FILE))?;

    if manifest.rows != corpus.len() {
        return Err(MatcherError::RowCountMismatch {
            matrix_rows: manifest.rows,
            corpus_rows: corpus.len(),
        });
    }

    Ok(Bundle {
        manifest,
        model,
        matrix: stored.matrix,
        corpus,
    })
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MatcherError> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Total size in bytes of the files directly inside `dir`.
#[must_use]
pub fn dir_size(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter_map(|e| e.metadata().ok())
                .filter(std::fs::Metadata::is_file)
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use address_normalizer_matcher_models::VectorizerConfig;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("address_normalizer_bundle_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn entry(address: &str, id: &str) -> CorpusEntry {
        CorpusEntry {
            address: address.to_string(),
            normalized: crate::normalize::normalize(address),
            street: String::new(),
            housenumber: "1".to_string(),
            latitude: 55.0,
            longitude: 37.0,
            id: id.to_string(),
        }
    }

    fn fitted() -> (TermWeightModel, SparseMatrix, Vec<CorpusEntry>) {
        let corpus = vec![entry("ул. Ленина, д. 1", "1"), entry("пр. Мира, д. 1", "2")];
        let docs: Vec<&str> = corpus.iter().map(|e| e.normalized.as_str()).collect();
        let (model, matrix) =
            TermWeightModel::fit(&docs, VectorizerConfig::default(), &NullProgress).unwrap();
        (model, matrix, corpus)
    }

    #[test]
    fn save_then_load() {
        let dir = temp_dir("save_then_load");
        let (model, matrix, corpus) = fitted();

        let manifest = save(&dir, &model, &matrix, &corpus).unwrap();
        assert!(exists(&dir));
        assert_eq!(manifest.rows, 2);
        assert_eq!(manifest.columns, model.dimension());
        assert!(dir_size(&dir) > 0);
        assert!(!dir.join("model.msgpack.tmp").exists());

        let bundle = load(&dir).unwrap();
        assert_eq!(bundle.manifest, manifest);
        assert_eq!(bundle.model, model);
        assert_eq!(bundle.matrix, matrix);
        assert_eq!(bundle.corpus, corpus);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_bundle_is_not_found() {
        let dir = temp_dir("missing");
        assert!(matches!(load(&dir), Err(MatcherError::IndexNotFound(_))));
    }

    #[test]
    fn replaced_model_is_stale() {
        let dir = temp_dir("replaced_model");
        let (model, matrix, corpus) = fitted();
        save(&dir, &model, &matrix, &corpus).unwrap();

        let (other, _) =
            TermWeightModel::fit(&["улица арбат"], VectorizerConfig::default(), &NullProgress)
                .unwrap();
        std::fs::write(dir.join(MODEL_FILE), other.to_bytes().unwrap()).unwrap();

        assert!(matches!(load(&dir), Err(MatcherError::StaleIndex { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn replaced_matrix_is_stale() {
        let dir = temp_dir("replaced_matrix");
        let (model, matrix, corpus) = fitted();
        save(&dir, &model, &matrix, &corpus).unwrap();

        let stored = StoredMatrix {
            model_fingerprint: "0".repeat(64),
            matrix,
        };
        std::fs::write(dir.join(MATRIX_FILE), rmp_serde::to_vec(&stored).unwrap()).unwrap();

        match load(&dir) {
            Err(MatcherError::StaleIndex { actual, .. }) => assert_eq!(actual, "0".repeat(64)),
            other => panic!("expected stale index, got {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_matrix_layout_is_an_error() {
        #[derive(Serialize)]
        struct RawMatrix {
            n_cols: usize,
            indptr: Vec<usize>,
            indices: Vec<u32>,
            data: Vec<f32>,
        }

        #[derive(Serialize)]
        struct RawStored {
            model_fingerprint: String,
            matrix: RawMatrix,
        }

        let dir = temp_dir("corrupt_matrix");
        let (model, matrix, corpus) = fitted();
        save(&dir, &model, &matrix, &corpus).unwrap();

        let raw = RawStored {
            model_fingerprint: model.fingerprint().unwrap(),
            matrix: RawMatrix {
                n_cols: matrix.n_cols(),
                indptr: vec![0, 5, 3],
                indices: vec![0, 1, 2],
                data: vec![1.0, 1.0, 1.0],
            },
        };
        std::fs::write(dir.join(MATRIX_FILE), rmp_serde::to_vec(&raw).unwrap()).unwrap();

        match load(&dir) {
            Err(MatcherError::Other(message)) => assert!(message.contains("indptr")),
            other => panic!("expected a matrix layout error, got {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn truncated_corpus_is_a_row_mismatch() {
        let dir = temp_dir("truncated_corpus");
        let (model, matrix, corpus) = fitted();
        save(&dir, &model, &matrix, &corpus).unwrap();

        let mut buf = Vec::new();
        corpus::write_corpus(&mut buf, &corpus[..1], "buffer").unwrap();
        std::fs::write(dir.join(CORPUS_FILE), buf).unwrap();

        assert!(matches!(
            load(&dir),
            Err(MatcherError::RowCountMismatch {
                matrix_rows: 2,
                corpus_rows: 1
            })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let dir = temp_dir("format_version");
        let (model, matrix, corpus) = fitted();
        save(&dir, &model, &matrix, &corpus).unwrap();

        let text = std::fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap();
        let text = text.replace("format_version = 1", "format_version = 99");
        std::fs::write(dir.join(MANIFEST_FILE), text).unwrap();

        assert!(matches!(
            load(&dir),
            Err(MatcherError::UnsupportedFormat {
                found: 99,
                supported: 1
            })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
