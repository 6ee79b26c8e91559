// 🌐 HTTP facade - REST API with Axum
// Thin layer over ProximityEngine; the engine runs on the blocking pool

use crate::engine::{ProximityEngine, DEFAULT_LIMIT, DEFAULT_RADIUS_KM};
use crate::error::NearbyError;
use crate::pool::Liveness;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::num::IntErrorKind;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: ProximityEngine,
}

/// Error body
#[derive(Serialize)]
struct ApiError {
    success: bool,
    kind: &'static str,
    error: String,
}

impl IntoResponse for NearbyError {
    fn into_response(self) -> Response {
        let status = match &self {
            NearbyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            NearbyError::PoolExhausted { .. } | NearbyError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            NearbyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ApiError {
            success: false,
            kind: self.kind(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Query string for GET /api/nearby
#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_km")]
    pub km: f64,
    /// Integers beyond the i64 range saturate; the engine clamps them anyway
    #[serde(default = "default_limit", deserialize_with = "saturating_i64")]
    pub limit: i64,
}

fn default_km() -> f64 {
    DEFAULT_RADIUS_KM
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn saturating_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().parse::<i64>() {
        Ok(value) => Ok(value),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(de::Error::custom(format!(
                "expected an integer, got {:?}",
                raw
            ))),
        },
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/nearby?lat&lon&km&limit - ranked points of interest
async fn nearby(
    State(state): State<AppState>,
    params: std::result::Result<Query<NearbyParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "nearby query string rejected");
            return NearbyError::InvalidRequest(rejection.body_text()).into_response();
        }
    };

    let engine = state.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        engine.find_nearby(params.lat, params.lon, params.km, params.limit)
    })
    .await;

    match outcome {
        Ok(Ok(results)) => (StatusCode::OK, Json(results)).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(kind = e.kind(), error = %e, "nearby query failed");
            e.into_response()
        }
        Err(join_err) => {
            tracing::error!(error = %join_err, "nearby query task failed");
            NearbyError::StoreUnavailable(join_err.to_string()).into_response()
        }
    }
}

/// GET /health - liveness, always 200 with ok/degraded status
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.clone();
    let liveness = tokio::task::spawn_blocking(move || engine.probe_liveness())
        .await
        .unwrap_or_else(|e| Liveness::Degraded {
            detail: e.to_string(),
        });

    (StatusCode::OK, Json(liveness))
}

/// GET /api/pool - pool occupancy counters
async fn pool_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.pool().stats())
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/nearby", get(nearby))
        .route("/health", get(health))
        .route("/pool", get(pool_stats))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .with_state(state)
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
