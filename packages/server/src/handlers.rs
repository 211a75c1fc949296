//! HTTP handler functions for the address normalizer API.

use actix_web::{HttpResponse, web};
use address_normalizer_matcher::{AddressIndex, MatchConfig};
use address_normalizer_server_models::{
    ApiError, ApiHealth, ApiReload, MatchParams, NormalizeRequest, NormalizeResponse,
};

use crate::AppState;

fn error_response(mut builder: actix_web::HttpResponseBuilder, message: String) -> HttpResponse {
    builder.json(ApiError { error: message })
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        records: state.index.snapshot().len(),
    })
}

/// `POST /normalize`
///
/// Resolves a free-form address. `k` and `score_threshold` query
/// parameters override the server defaults for this request.
pub async fn normalize(
    state: web::Data<AppState>,
    params: web::Query<MatchParams>,
    body: web::Json<NormalizeRequest>,
) -> HttpResponse {
    let address = body.into_inner().address;
    if address.trim().is_empty() {
        return error_response(
            HttpResponse::BadRequest(),
            "address must not be empty".to_string(),
        );
    }

    let config = MatchConfig {
        k: params.k.unwrap_or(state.defaults.k),
        score_threshold: params
            .score_threshold
            .unwrap_or(state.defaults.score_threshold),
        method: state.defaults.method,
    };

    if !(0.0..=100.0).contains(&config.score_threshold) {
        return error_response(
            HttpResponse::BadRequest(),
            format!(
                "score_threshold must be between 0 and 100, got {}",
                config.score_threshold
            ),
        );
    }

    let index = state.index.snapshot();
    let result = web::block(move || index.resolve(&address, &config)).await;

    match result {
        Ok(Ok(found)) => HttpResponse::Ok().json(NormalizeResponse::from(found)),
        Ok(Err(e)) => {
            log::error!("Failed to resolve address: {e}");
            error_response(HttpResponse::InternalServerError(), e.to_string())
        }
        Err(e) => {
            log::error!("Resolve task failed: {e}");
            error_response(
                HttpResponse::InternalServerError(),
                "Failed to resolve address".to_string(),
            )
        }
    }
}

/// `POST /api/reload`
///
/// Re-opens the index bundle and swaps it in. Requests already in flight
/// finish against the index they started with. On failure the current
/// index stays in place.
pub async fn reload(state: web::Data<AppState>) -> HttpResponse {
    let index_dir = state.index_dir.clone();
    let result = web::block(move || AddressIndex::open(&index_dir)).await;

    match result {
        Ok(Ok(index)) => {
            let response = ApiReload {
                records: index.len(),
                model_fingerprint: index.manifest().model_fingerprint.clone(),
            };
            state.index.replace(index);
            log::info!(
                "Reloaded index from {} ({} records)",
                state.index_dir.display(),
                response.records
            );
            HttpResponse::Ok().json(response)
        }
        Ok(Err(e)) => {
            log::error!("Failed to reload index: {e}");
            error_response(HttpResponse::InternalServerError(), e.to_string())
        }
        Err(e) => {
            log::error!("Reload task failed: {e}");
            error_response(
                HttpResponse::InternalServerError(),
                "Failed to reload index".to_string(),
            )
        }
    }
}
