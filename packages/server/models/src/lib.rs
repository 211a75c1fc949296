#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the address normalizer server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the matcher types so the wire contract can evolve independently.

use address_normalizer_matcher_models::MatchResult;
use serde::{Deserialize, Serialize};

/// Body of `POST /normalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeRequest {
    /// Free-form address to resolve.
    pub address: String,
}

/// Query parameters of `POST /normalize`.
///
/// Unset fields fall back to the server's configured defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MatchParams {
    /// Candidate pool size.
    pub k: Option<usize>,
    /// Minimum accepted score (0-100).
    pub score_threshold: Option<f64>,
}

/// A matched address as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMatchedAddress {
    /// Display address of the matched record.
    pub found_address: String,
    /// Street name.
    pub street: String,
    /// House number.
    pub housenumber: u32,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Score and method, e.g. `"61.5 (token_sort_ratio)"`.
    pub score: String,
    /// Record id.
    pub id: i64,
}

impl From<MatchResult> for ApiMatchedAddress {
    fn from(result: MatchResult) -> Self {
        let score = result.score_label();
        Self {
            found_address: result.record.address,
            street: result.record.street,
            housenumber: result.record.housenumber,
            latitude: result.record.latitude,
            longitude: result.record.longitude,
            score,
            id: result.record.id,
        }
    }
}

/// Response of `POST /normalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeResponse {
    /// The match, or `null` when nothing reached the threshold.
    pub normalized_address: Option<ApiMatchedAddress>,
}

impl From<Option<MatchResult>> for NormalizeResponse {
    fn from(result: Option<MatchResult>) -> Self {
        Self {
            normalized_address: result.map(Into::into),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Records in the loaded index.
    pub records: usize,
}

/// Response of `POST /api/reload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiReload {
    /// Records in the newly loaded index.
    pub records: usize,
    /// Fingerprint of the newly loaded model.
    pub model_fingerprint: String,
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
}
