//! Smoke test runner for a built index.
//!
//! Loads hand-typed queries from the embedded `smoke_tests.toml` (or a
//! custom file) and resolves each one, checking that it lands on the
//! expected corpus id. Entries without an `expected_id` must not match.
//!
//! The embedded file is written against the demo corpus in
//! `data/demo/addresses.csv`.

use address_normalizer_matcher_models::MatchConfig;
use serde::Deserialize;

use crate::{AddressIndex, MatcherError};

/// Embedded smoke test configuration (compiled into the binary).
pub const SMOKE_TESTS_TOML: &str = include_str!("../smoke_tests.toml");

#[derive(Debug, Deserialize)]
struct SmokeTestConfig {
    tests: Vec<SmokeTestEntry>,
}

#[derive(Debug, Deserialize)]
struct SmokeTestEntry {
    query: String,
    expected_id: Option<i64>,
}

/// Result of a single smoke test.
#[derive(Debug)]
pub struct SmokeTestResult {
    /// The query that was resolved.
    pub query: String,
    /// Expected record id, or `None` if no match was expected.
    pub expected_id: Option<i64>,
    /// Id of the matched record (if any).
    pub actual_id: Option<i64>,
    /// Display address of the matched record (if any).
    pub matched_address: Option<String>,
    /// Stage 2 score (if matched).
    pub score: Option<f64>,
    /// Whether the test passed.
    pub passed: bool,
    /// Reason for failure (if any).
    pub failure_reason: Option<String>,
}

/// Aggregate report from running all smoke tests.
#[derive(Debug)]
pub struct SmokeTestReport {
    /// Individual test results.
    pub results: Vec<SmokeTestResult>,
    /// Number of tests that passed.
    pub passed: usize,
    /// Total number of tests.
    pub total: usize,
}

impl SmokeTestReport {
    /// Returns `true` if all tests passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Runs the embedded smoke tests.
///
/// # Errors
///
/// Returns an error if the embedded file cannot be parsed or a query
/// hits a corpus-integrity fault.
pub fn run_smoke_tests(
    index: &AddressIndex,
    config: &MatchConfig,
) -> Result<SmokeTestReport, MatcherError> {
    run_smoke_tests_from(index, config, SMOKE_TESTS_TOML)
}

/// Runs smoke tests from TOML text.
///
/// # Errors
///
/// Returns an error if the TOML cannot be parsed or a query hits a
/// corpus-integrity fault.
pub fn run_smoke_tests_from(
    index: &AddressIndex,
    config: &MatchConfig,
    toml_text: &str,
) -> Result<SmokeTestReport, MatcherError> {
    let tests: SmokeTestConfig = toml::from_str(toml_text)
        .map_err(|e| MatcherError::Other(format!("Failed to parse smoke tests: {e}")))?;

    let results = tests
        .tests
        .iter()
        .map(|entry| run_single_test(index, config, entry))
        .collect::<Result<Vec<_>, _>>()?;

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    Ok(SmokeTestReport {
        results,
        passed,
        total,
    })
}

fn run_single_test(
    index: &AddressIndex,
    config: &MatchConfig,
    entry: &SmokeTestEntry,
) -> Result<SmokeTestResult, MatcherError> {
    let found = index.resolve(&entry.query, config)?;
    let actual_id = found.as_ref().map(|m| m.record.id);

    let failure_reason = match (entry.expected_id, &found) {
        (Some(expected), Some(m)) if m.record.id != expected => Some(format!(
            "matched id {} ('{}') instead of {expected}",
            m.record.id, m.record.address
        )),
        (Some(_), None) => Some("no match found".to_string()),
        (None, Some(m)) => Some(format!(
            "expected no match, got id {} ('{}')",
            m.record.id, m.record.address
        )),
        _ => None,
    };

    Ok(SmokeTestResult {
        query: entry.query.clone(),
        expected_id: entry.expected_id,
        actual_id,
        matched_address: found.as_ref().map(|m| m.record.address.clone()),
        score: found.as_ref().map(|m| m.score),
        passed: failure_reason.is_none(),
        failure_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::read_source;
    use crate::progress::NullProgress;
    use address_normalizer_matcher_models::VectorizerConfig;

    const DEMO_CSV: &str = include_str!("../../../data/demo/addresses.csv");

    fn demo_index() -> AddressIndex {
        let loaded = read_source(DEMO_CSV.as_bytes(), "demo", &NullProgress).unwrap();
        assert_eq!(loaded.skipped, 0);
        AddressIndex::build(loaded.entries, VectorizerConfig::default(), &NullProgress).unwrap()
    }

    #[test]
    fn parses_embedded_toml() {
        let config: SmokeTestConfig = toml::from_str(SMOKE_TESTS_TOML).unwrap();
        assert!(
            !config.tests.is_empty(),
            "smoke_tests.toml must have at least one test"
        );
        for test in &config.tests {
            assert!(!test.query.is_empty(), "query must not be empty");
        }
    }

    #[test]
    fn embedded_tests_pass_on_demo_corpus() {
        let index = demo_index();
        let report = run_smoke_tests(&index, &MatchConfig::default()).unwrap();

        for result in &report.results {
            assert!(
                result.passed,
                "'{}': {}",
                result.query,
                result.failure_reason.as_deref().unwrap_or("")
            );
        }
        assert!(report.all_passed());
        assert_eq!(report.total, 7);
    }

    #[test]
    fn reports_wrong_matches() {
        let index = demo_index();
        let toml_text = r#"
[[tests]]
query = "ул. Арбат, д. 5"
expected_id = 4

[[tests]]
query = "ул. Тверская, д. 12"
"#;
        let report = run_smoke_tests_from(&index, &MatchConfig::default(), toml_text).unwrap();

        assert_eq!(report.passed, 0);
        assert_eq!(report.total, 2);
        assert_eq!(report.results[0].actual_id, Some(3));
        assert_eq!(report.results[1].actual_id, Some(2));
        assert!(!report.all_passed());
    }

    #[test]
    fn rejects_malformed_toml() {
        let index = demo_index();
        let err = run_smoke_tests_from(&index, &MatchConfig::default(), "tests = 5").unwrap_err();
        assert!(matches!(err, MatcherError::Other(_)));
    }
}
