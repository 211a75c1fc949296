//! Subcommand implementations.

use std::path::{Path, PathBuf};

use address_normalizer_cli_utils::{IndicatifProgress, MultiProgress};
use address_normalizer_matcher::verify::{self, SmokeTestReport};
use address_normalizer_matcher::{AddressIndex, MatchConfig, VectorizerConfig, build_index};
use address_normalizer_server_models::NormalizeResponse;

/// Builds an index bundle and prints its statistics.
pub async fn build(
    multi: &MultiProgress,
    source: &Path,
    index_dir: &Path,
    config: VectorizerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!(
        "Building index from {} into {}",
        source.display(),
        index_dir.display()
    );
    let progress = IndicatifProgress::records_bar(multi, "Building index");
    let stats = build_index(source, index_dir, config, progress).await?;

    #[allow(clippy::cast_precision_loss)]
    let mb = stats.index_size_bytes as f64 / 1_048_576.0;
    println!("Index written to {}", index_dir.display());
    println!("  records:    {}", stats.total_records);
    println!("  skipped:    {}", stats.skipped_records);
    println!("  vocabulary: {}", stats.vocabulary_size);
    println!("  nonzeros:   {}", stats.nonzeros);
    println!("  size:       {mb:.1} MB");
    println!("  time:       {:.1}s", stats.build_time_secs);

    Ok(())
}

/// Resolves one address and prints the API response JSON.
pub async fn resolve(
    index_dir: PathBuf,
    address: String,
    config: MatchConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    log::debug!("Resolving {address:?} against {}", index_dir.display());
    let found = tokio::task::spawn_blocking(move || {
        let index = AddressIndex::open(&index_dir)?;
        index.resolve(&address, &config)
    })
    .await??;

    let response = NormalizeResponse::from(found);
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

/// Runs smoke tests against a bundle.
///
/// Fails if any test fails, so the process exits non-zero.
pub async fn verify(
    index_dir: PathBuf,
    tests: Option<PathBuf>,
    config: MatchConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let toml_text = match &tests {
        Some(path) => std::fs::read_to_string(path)?,
        None => verify::SMOKE_TESTS_TOML.to_string(),
    };

    let report = tokio::task::spawn_blocking(move || {
        let index = AddressIndex::open(&index_dir)?;
        verify::run_smoke_tests_from(&index, &config, &toml_text)
    })
    .await??;

    print_report(&report);

    if report.all_passed() {
        log::info!("All {} smoke tests passed", report.total);
        Ok(())
    } else {
        Err(format!("{} of {} smoke tests failed", report.total - report.passed, report.total).into())
    }
}

fn print_report(report: &SmokeTestReport) {
    for result in &report.results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        let matched = match (&result.matched_address, result.score) {
            (Some(address), Some(score)) => format!("{address} ({score:.1})"),
            _ => "no match".to_string(),
        };
        println!("[{status}] {:<32} -> {matched}", result.query);
        if let Some(reason) = &result.failure_reason {
            println!("       {reason}");
        }
    }
    println!("{}/{} passed", report.passed, report.total);
}
