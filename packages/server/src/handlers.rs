//! HTTP handler functions for the landwatch API.

use actix_web::{HttpResponse, web};
use landwatch_models::LocationQuery;

use crate::AppState;
use crate::models::{ApiHealth, SearchRequest, SearchResponse};

/// Caller-visible message for the too-few-captures precondition.
const INSUFFICIENT_MESSAGE: &str = "Not enough images found for this location.";

/// Caller-visible message for every other failure kind.
const GENERIC_MESSAGE: &str = "Something went wrong";

/// `GET /health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /search`
///
/// Runs the full acquisition-and-analysis pipeline for one coordinate.
/// Failure kinds are logged individually but mapped coarsely for the
/// caller: `400` with a specific message when the archive holds too few
/// captures, `500` with a generic message for everything else.
pub async fn search(state: web::Data<AppState>, body: web::Json<SearchRequest>) -> HttpResponse {
    let (Some(latitude), Some(longitude)) = (body.lat.as_f64(), body.lang.as_f64()) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "lat and lang must be decimal coordinates"
        }));
    };

    let query = LocationQuery {
        latitude,
        longitude,
    };

    match state.pipeline.run(query).await {
        Ok(result) => HttpResponse::Ok().json(SearchResponse::from(result)),
        Err(e) if e.is_insufficient_results() => {
            log::warn!("Search rejected: {e}");
            HttpResponse::BadRequest().json(serde_json::json!({ "error": INSUFFICIENT_MESSAGE }))
        }
        Err(e) => {
            log::error!("Pipeline failed: {e}");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": GENERIC_MESSAGE }))
        }
    }
}
