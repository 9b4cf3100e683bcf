//! API handlers for the `/api/oui/*` HTTP endpoints.

use actix_web::web::{Data, Json, Path, Query, ServiceConfig};
use actix_web::{HttpResponse, Responder, get, post};
use serde::{Deserialize, Serialize};

use crate::oui::{CacheError, DEFAULT_SEARCH_LIMIT, OuiCache, RefreshOutcome};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(lookup_mac)
        .service(search_vendor)
        .service(lookup_batch)
        .service(cache_stats)
        .service(refresh_cache);
}

fn error_response(err: &CacheError) -> HttpResponse {
    match err {
        CacheError::Validation(message) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
        }
        CacheError::Store(e) => {
            tracing::error!(error = %e, "OUI cache storage failure");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "OUI cache storage failure"
            }))
        }
    }
}

fn task_error(e: tokio::task::JoinError) -> HttpResponse {
    tracing::error!(error = %e, "Blocking OUI cache task failed");
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal error"
    }))
}

// ============================================================================
// Lookup
// ============================================================================

#[get("/api/oui/lookup/{mac}")]
pub async fn lookup_mac(cache: Data<OuiCache>, mac: Path<String>) -> impl Responder {
    let cache = cache.into_inner();
    let mac = mac.into_inner();
    let result = tokio::task::spawn_blocking(move || cache.lookup_mac(&mac)).await;

    match result {
        Ok(Ok(Some(info))) => HttpResponse::Ok().json(info),
        Ok(Ok(None)) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Vendor not found"
        })),
        Ok(Err(e)) => error_response(&e),
        Err(e) => task_error(e),
    }
}

#[derive(Deserialize)]
pub struct BatchRequest {
    macs: Vec<String>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    total: usize,
    found: usize,
    results: Vec<crate::oui::BatchEntry>,
}

#[post("/api/oui/batch")]
pub async fn lookup_batch(cache: Data<OuiCache>, body: Json<BatchRequest>) -> impl Responder {
    let cache = cache.into_inner();
    let macs = body.into_inner().macs;
    let result = tokio::task::spawn_blocking(move || cache.lookup_batch(&macs)).await;

    match result {
        Ok(Ok(results)) => {
            let found = results
                .iter()
                .filter(|entry| entry.vendor.is_some())
                .count();
            HttpResponse::Ok().json(BatchResponse {
                total: results.len(),
                found,
                results,
            })
        }
        Ok(Err(e)) => error_response(&e),
        Err(e) => task_error(e),
    }
}

// ============================================================================
// Search
// ============================================================================

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

#[get("/api/oui/search")]
pub async fn search_vendor(cache: Data<OuiCache>, query: Query<SearchQuery>) -> impl Responder {
    let cache = cache.into_inner();
    let SearchQuery { q, limit } = query.into_inner();
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let result = tokio::task::spawn_blocking(move || cache.search_vendor(&q, limit)).await;

    match result {
        Ok(Ok(vendors)) => HttpResponse::Ok().json(vendors),
        Ok(Err(e)) => error_response(&e),
        Err(e) => task_error(e),
    }
}

// ============================================================================
// Cache maintenance
// ============================================================================

#[get("/api/oui/stats")]
pub async fn cache_stats(cache: Data<OuiCache>) -> impl Responder {
    let cache = cache.into_inner();
    let result = tokio::task::spawn_blocking(move || cache.stats()).await;

    match result {
        Ok(Ok(stats)) => HttpResponse::Ok().json(stats),
        Ok(Err(e)) => error_response(&e),
        Err(e) => task_error(e),
    }
}

#[derive(Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    status: &'static str,
    records: Option<usize>,
    message: String,
}

impl From<RefreshOutcome> for RefreshResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        let records = match &outcome {
            RefreshOutcome::Refreshed { records } => Some(*records),
            _ => None,
        };
        Self {
            status: outcome.as_str(),
            records,
            message: outcome.to_string(),
        }
    }
}

#[post("/api/oui/refresh")]
pub async fn refresh_cache(cache: Data<OuiCache>, query: Query<RefreshQuery>) -> impl Responder {
    let cache = cache.into_inner();
    let force = query.force;
    let result = tokio::task::spawn_blocking(move || cache.update(force)).await;

    match result {
        Ok(Ok(outcome)) => HttpResponse::Ok().json(RefreshResponse::from(outcome)),
        Ok(Err(e)) => error_response(&e),
        Err(e) => task_error(e),
    }
}
