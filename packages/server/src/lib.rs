#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the address normalizer.
//!
//! Serves `POST /normalize` (also under `/api`) against an index bundle
//! loaded at startup. The bundle can be swapped at runtime with
//! `POST /api/reload` after a rebuild.

mod handlers;

use std::path::PathBuf;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use address_normalizer_matcher::{AddressIndex, MatchConfig, ScoreMethod, SharedIndex};

/// Shared application state.
pub struct AppState {
    /// Currently loaded index.
    pub index: SharedIndex,
    /// Directory the index is (re)loaded from.
    pub index_dir: PathBuf,
    /// Match options used when a request does not override them.
    pub defaults: MatchConfig,
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Index bundle directory.
    pub index_dir: PathBuf,
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Default match options.
    pub defaults: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            index_dir: address_normalizer_matcher::default_index_dir(),
            bind_addr: "127.0.0.1".to_string(),
            port: 8000,
            defaults: MatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads settings from `INDEX_DIR`, `BIND_ADDR`, `PORT`, `MATCH_K`,
    /// `MATCH_SCORE_THRESHOLD` and `MATCH_METHOD`.
    ///
    /// Unset or unparseable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(port) = env_parse("PORT") {
            config.port = port;
        }
        if let Some(k) = env_parse("MATCH_K") {
            config.defaults.k = k;
        }
        if let Some(threshold) = env_parse("MATCH_SCORE_THRESHOLD") {
            config.defaults.score_threshold = threshold;
        }
        if let Some(method) = env_parse::<ScoreMethod>("MATCH_METHOD") {
            config.defaults.method = method;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    let parsed = value.parse().ok();
    if parsed.is_none() {
        log::warn!("Ignoring invalid {name}={value:?}");
    }
    parsed
}

/// Registers the API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/normalize", web::post().to(handlers::normalize))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(handlers::health))
                .route("/normalize", web::post().to(handlers::normalize))
                .route("/reload", web::post().to(handlers::reload)),
        );
}

/// Starts the address normalizer API server.
///
/// Opens the index bundle and starts the Actix-Web HTTP server. The
/// caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`) and for initializing logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the index cannot be opened, or
/// the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    log::info!("Opening index at {}...", config.index_dir.display());
    let index_dir = config.index_dir.clone();
    let index = web::block(move || AddressIndex::open(&index_dir))
        .await
        .map_err(std::io::Error::other)?
        .map_err(std::io::Error::other)?;

    log::info!(
        "Serving {} records (k={}, score_threshold={}, method={})",
        index.len(),
        config.defaults.k,
        config.defaults.score_threshold,
        config.defaults.method
    );

    let state = web::Data::new(AppState {
        index: SharedIndex::new(index),
        index_dir: config.index_dir,
        defaults: config.defaults,
    });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use address_normalizer_matcher::VectorizerConfig;
    use address_normalizer_matcher::corpus::CorpusEntry;
    use address_normalizer_matcher::normalize::normalize;
    use address_normalizer_matcher::progress::NullProgress;
    use address_normalizer_server_models::{ApiHealth, ApiReload, NormalizeResponse};
    use serde_json::json;

    fn entry(address: &str, housenumber: &str, id: &str) -> CorpusEntry {
        CorpusEntry {
            address: address.to_string(),
            normalized: normalize(address),
            street: "Арбат".to_string(),
            housenumber: housenumber.to_string(),
            latitude: 55.751_832,
            longitude: 37.598_457,
            id: id.to_string(),
        }
    }

    fn demo_index() -> AddressIndex {
        AddressIndex::build(
            vec![
                entry("ул. Арбат, д. 5", "5", "3"),
                entry("ул. Арбат, д. 50", "50", "4"),
                entry("ул. Петровка, д. 38а", "38а", "8"),
            ],
            VectorizerConfig::default(),
            &NullProgress,
        )
        .unwrap()
    }

    fn state(index_dir: PathBuf) -> web::Data<AppState> {
        web::Data::new(AppState {
            index: SharedIndex::new(demo_index()),
            index_dir,
            defaults: MatchConfig::default(),
        })
    }

    fn missing_dir() -> PathBuf {
        std::env::temp_dir().join("address_normalizer_server_missing_index")
    }

    #[actix_web::test]
    async fn normalize_returns_match() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/normalize")
            .set_json(json!({"address": "ул. Арбат, д. 5"}))
            .to_request();
        let resp: NormalizeResponse = test::call_and_read_body_json(&app, req).await;

        let found = resp.normalized_address.expect("should match");
        assert_eq!(found.id, 3);
        assert_eq!(found.housenumber, 5);
        assert_eq!(found.found_address, "ул. Арбат, д. 5");
        assert_eq!(found.score, "100.0 (token_sort_ratio)");
    }

    #[actix_web::test]
    async fn api_scope_serves_normalize_too() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/normalize")
            .set_json(json!({"address": "арбат 50"}))
            .to_request();
        let resp: NormalizeResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.normalized_address.map(|a| a.id), Some(4));
    }

    #[actix_web::test]
    async fn unmatched_address_is_null() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/normalize")
            .set_json(json!({"address": "!!!"}))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, r#"{"normalized_address":null}"#.as_bytes());
    }

    #[actix_web::test]
    async fn query_params_override_defaults() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/normalize?score_threshold=100")
            .set_json(json!({"address": "арбат 5"}))
            .to_request();
        let resp: NormalizeResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.normalized_address.is_none());

        let req = test::TestRequest::post()
            .uri("/normalize?k=0")
            .set_json(json!({"address": "ул. Арбат, д. 5"}))
            .to_request();
        let resp: NormalizeResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.normalized_address.is_none());
    }

    #[actix_web::test]
    async fn rejects_bad_input() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/normalize")
            .set_json(json!({"address": "   "}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/normalize?score_threshold=150")
            .set_json(json!({"address": "арбат 5"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/normalize")
            .set_json(json!({"street": "арбат"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn corpus_fault_is_a_server_error() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/normalize")
            .set_json(json!({"address": "ул. Петровка, д. 38а"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("housenumber"));
    }

    #[actix_web::test]
    async fn health_reports_records() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp: ApiHealth = test::call_and_read_body_json(&app, req).await;
        assert!(resp.healthy);
        assert_eq!(resp.records, 3);
    }

    #[actix_web::test]
    async fn reload_swaps_index() {
        let dir = std::env::temp_dir().join("address_normalizer_server_reload");
        let _ = std::fs::remove_dir_all(&dir);

        let replacement = AddressIndex::build(
            vec![entry("ул. Арбат, д. 5", "5", "3")],
            VectorizerConfig::default(),
            &NullProgress,
        )
        .unwrap();
        replacement.save(&dir).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(state(dir.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/reload").to_request();
        let resp: ApiReload = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.records, 1);
        assert_eq!(
            resp.model_fingerprint,
            replacement.manifest().model_fingerprint
        );

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let health: ApiHealth = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health.records, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[actix_web::test]
    async fn failed_reload_keeps_current_index() {
        let app = test::init_service(
            App::new()
                .app_data(state(missing_dir()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/reload").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let health: ApiHealth = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health.records, 3);
    }
}
