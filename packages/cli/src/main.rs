#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line interface for the address normalizer.
//!
//! Builds index bundles from source address tables, resolves single
//! addresses, runs the smoke tests against a bundle, and starts the HTTP
//! server.
//!
//! Uses `indicatif-log-bridge` (via [`address_normalizer_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;

use std::path::PathBuf;

use address_normalizer_matcher::{Analyzer, MatchConfig, ScoreMethod, VectorizerConfig};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "address_normalizer", about = "Hybrid TF-IDF + fuzzy address matcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index bundle from a source address CSV
    Build {
        /// Source CSV (`address,street,housenumber,latitude,longitude,id`)
        #[arg(long)]
        source: PathBuf,
        /// Output bundle directory (default: `data/index`)
        #[arg(long)]
        index_dir: Option<PathBuf>,
        /// Term extraction: `char_wb`, `char` or `word`
        #[arg(long, default_value = "char_wb")]
        analyzer: Analyzer,
        /// Smallest n-gram length
        #[arg(long, default_value = "2")]
        ngram_min: usize,
        /// Largest n-gram length
        #[arg(long, default_value = "3")]
        ngram_max: usize,
        /// Use `1 + ln(tf)` term frequencies
        #[arg(long)]
        sublinear_tf: bool,
    },
    /// Resolve a single address and print the response JSON
    Match {
        /// Free-form address
        address: String,
        #[command(flatten)]
        options: MatchOptions,
    },
    /// Run smoke tests against a bundle; exits non-zero on failure
    Verify {
        /// Smoke test TOML file (default: the embedded demo tests)
        #[arg(long)]
        tests: Option<PathBuf>,
        #[command(flatten)]
        options: MatchOptions,
    },
    /// Start the HTTP server
    Serve {
        /// Bundle directory (overrides `INDEX_DIR`)
        #[arg(long)]
        index_dir: Option<PathBuf>,
        /// Bind address (overrides `BIND_ADDR`)
        #[arg(long)]
        bind_addr: Option<String>,
        /// Port (overrides `PORT`)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(clap::Args)]
struct MatchOptions {
    /// Bundle directory (default: `data/index`)
    #[arg(long)]
    index_dir: Option<PathBuf>,
    /// Candidate pool size
    #[arg(long, default_value = "10")]
    k: usize,
    /// Minimum accepted score (0-100)
    #[arg(long, default_value = "50")]
    score_threshold: f64,
    /// Fine scoring method: `token_sort_ratio` or `token_sort_levenshtein`
    #[arg(long, default_value = "token_sort_ratio")]
    method: ScoreMethod,
}

impl MatchOptions {
    fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(address_normalizer_matcher::default_index_dir)
    }

    fn config(&self) -> Result<MatchConfig, Box<dyn std::error::Error>> {
        if !(0.0..=100.0).contains(&self.score_threshold) {
            return Err(format!(
                "--score-threshold must be between 0 and 100, got {}",
                self.score_threshold
            )
            .into());
        }
        Ok(MatchConfig {
            k: self.k,
            score_threshold: self.score_threshold,
            method: self.method,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = address_normalizer_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            source,
            index_dir,
            analyzer,
            ngram_min,
            ngram_max,
            sublinear_tf,
        } => {
            let index_dir =
                index_dir.unwrap_or_else(address_normalizer_matcher::default_index_dir);
            let config = VectorizerConfig {
                analyzer,
                ngram_min,
                ngram_max,
                sublinear_tf,
            };
            commands::build(&multi, &source, &index_dir, config).await?;
        }
        Commands::Match { address, options } => {
            let config = options.config()?;
            commands::resolve(options.index_dir(), address, config).await?;
        }
        Commands::Verify { tests, options } => {
            let config = options.config()?;
            commands::verify(options.index_dir(), tests, config).await?;
        }
        Commands::Serve {
            index_dir,
            bind_addr,
            port,
        } => {
            let mut config = address_normalizer_server::ServerConfig::from_env();
            if let Some(dir) = index_dir {
                config.index_dir = dir;
            }
            if let Some(addr) = bind_addr {
                config.bind_addr = addr;
            }
            if let Some(port) = port {
                config.port = port;
            }

            log::info!(
                "Starting server on {}:{} with index {}",
                config.bind_addr,
                config.port,
                config.index_dir.display()
            );

            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new()
                    .block_on(address_normalizer_server::run_server(config))
            })
            .await??;
        }
    }

    Ok(())
}
