//! Reference corpus tables.
//!
//! Two CSV layouts are involved:
//!
//! - the **source** table fed to the builder
//!   (`address,street,housenumber,latitude,longitude,id`), whose rows are
//!   normalized and filtered here;
//! - the **corpus** table stored in an index bundle, which adds the
//!   `normalized` column and is kept in matrix row order.
//!
//! `housenumber` and `id` stay as text until a record is returned from a
//! match. Converting them is the point where a damaged corpus is detected.

use std::io::{Read, Write};
use std::path::Path;

use address_normalizer_matcher_models::AddressRecord;
use serde::{Deserialize, Serialize};

use crate::MatcherError;
use crate::normalize::{is_normalized, normalize};
use crate::progress::ProgressCallback;

/// A row of the source table.
#[derive(Debug, Deserialize)]
pub struct SourceRecord {
    /// Display address.
    pub address: String,
    /// Street name.
    #[serde(default)]
    pub street: String,
    /// House number as written in the source.
    #[serde(default)]
    pub housenumber: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Record id as written in the source.
    pub id: String,
}

impl SourceRecord {
    /// Converts this row into a corpus entry.
    ///
    /// Returns `None` if the address normalizes to nothing or the
    /// coordinates are not valid WGS84.
    #[must_use]
    pub fn into_entry(self) -> Option<CorpusEntry> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return None;
        }

        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude)
        {
            return None;
        }

        let normalized = normalize(&self.address);
        if normalized.is_empty() {
            return None;
        }

        Some(CorpusEntry {
            address: self.address,
            normalized,
            street: self.street.trim().to_string(),
            housenumber: self.housenumber.trim().to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            id: self.id.trim().to_string(),
        })
    }
}

/// A row of the corpus table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// Display address.
    pub address: String,
    /// Normalized form of `address`.
    pub normalized: String,
    /// Street name.
    pub street: String,
    /// House number text; must be integer-convertible.
    pub housenumber: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Record id text; must be integer-convertible.
    pub id: String,
}

impl CorpusEntry {
    /// Converts the entry into a typed record.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::CorpusIntegrity`] if `housenumber` or `id`
    /// is not an integer.
    pub fn to_record(&self, row: usize) -> Result<AddressRecord, MatcherError> {
        let housenumber = parse_integer(&self.housenumber)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| MatcherError::CorpusIntegrity {
                row,
                field: "housenumber",
                value: self.housenumber.clone(),
            })?;

        let id = parse_integer(&self.id).ok_or_else(|| MatcherError::CorpusIntegrity {
            row,
            field: "id",
            value: self.id.clone(),
        })?;

        Ok(AddressRecord {
            address: self.address.clone(),
            normalized: self.normalized.clone(),
            street: self.street.clone(),
            housenumber,
            latitude: self.latitude,
            longitude: self.longitude,
            id,
        })
    }
}

/// Parses integer text, also accepting float text with no fractional part
/// (`"5.0"`), which is how spreadsheet exports often write integers.
fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }

    let f = text.parse::<f64>().ok()?;
    #[allow(clippy::cast_precision_loss)]
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    if f.is_finite() && f.fract() == 0.0 && in_range {
        #[allow(clippy::cast_possible_truncation)]
        return Some(f as i64);
    }
    None
}

/// Entries read from a source table.
#[derive(Debug, Default)]
pub struct LoadedSource {
    /// Accepted rows, in file order.
    pub entries: Vec<CorpusEntry>,
    /// Rows that were malformed or filtered out.
    pub skipped: u64,
}

/// Errors from reading or writing corpus tables.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    /// CSV parsing or writing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path (or label) of the table.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// File does not exist.
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Reads and normalizes a source table from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its header is
/// unreadable. Individual malformed rows are skipped.
pub fn read_source_csv(
    path: &Path,
    progress: &dyn ProgressCallback,
) -> Result<LoadedSource, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::NotFound(path.display().to_string()));
    }

    let file = std::fs::File::open(path).map_err(|e| CorpusError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    read_source(file, &path.display().to_string(), progress)
}

/// Reads and normalizes a source table from any reader.
///
/// `label` names the source in error messages.
///
/// # Errors
///
/// Returns an error if the header cannot be read.
pub fn read_source(
    reader: impl Read,
    label: &str,
    progress: &dyn ProgressCallback,
) -> Result<LoadedSource, CorpusError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    csv_reader.headers().map_err(|e| CorpusError::Csv {
        path: label.to_string(),
        source: e,
    })?;

    progress.set_message(format!("Reading {label}"));

    let mut loaded = LoadedSource::default();
    for result in csv_reader.deserialize::<SourceRecord>() {
        progress.inc(1);

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                loaded.skipped += 1;
                continue;
            }
        };

        match record.into_entry() {
            Some(entry) => loaded.entries.push(entry),
            None => loaded.skipped += 1,
        }
    }

    log::debug!(
        "Read {} rows from {label} ({} skipped)",
        loaded.entries.len(),
        loaded.skipped
    );

    Ok(loaded)
}

/// Reads a corpus table from disk.
///
/// Unlike source tables, every row must parse: the corpus is paired
/// row-for-row with the stored matrix.
///
/// # Errors
///
/// Returns an error if the file is missing or any row is malformed.
pub fn read_corpus_csv(path: &Path) -> Result<Vec<CorpusEntry>, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::NotFound(path.display().to_string()));
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| CorpusError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;

    let entries = reader
        .deserialize::<CorpusEntry>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CorpusError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

    let stale = count_stale_normalized(&entries);
    if stale > 0 {
        log::warn!(
            "{stale} rows in {} were normalized under different rules; rebuild the index",
            path.display()
        );
    }

    Ok(entries)
}

/// Number of entries whose `normalized` column differs from what the
/// current normalizer produces for it.
#[must_use]
pub fn count_stale_normalized(entries: &[CorpusEntry]) -> usize {
    entries
        .iter()
        .filter(|e| !is_normalized(&e.normalized))
        .count()
}

/// Writes a corpus table.
///
/// # Errors
///
/// Returns an error if a row cannot be serialized or the writer fails.
pub fn write_corpus(
    writer: impl Write,
    entries: &[CorpusEntry],
    label: &str,
) -> Result<(), CorpusError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for entry in entries {
        csv_writer.serialize(entry).map_err(|e| CorpusError::Csv {
            path: label.to_string(),
            source: e,
        })?;
    }

    csv_writer.flush().map_err(|e| CorpusError::Io {
        path: label.to_string(),
        source: e,
    })
}
