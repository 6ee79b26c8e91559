//! Proximity query engine.
//!
//! Turns `(origin, radius_km, limit)` into an ordered, bounded, limited
//! result set:
//!
//! 1. Validate the origin, clamp `limit` to `[1, 100]`, bound `radius_km`
//! 2. Acquire a session (the only blocking point)
//! 3. Pull index-pruned candidates from the spatial store in one statement
//! 4. Compute the exact haversine distance for each candidate and keep
//!    those with `distance_km <= radius_km`
//! 5. Stable sort by distance, truncate to `limit`

use crate::config::StoreConfig;
use crate::entity::{NearbyResult, PointOfInterest};
use crate::error::Result;
use crate::geo::{distance_km, GeoPoint};
use crate::pool::{Liveness, SessionPool};
use crate::store;
use std::time::Instant;

pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const DEFAULT_LIMIT: i64 = 50;
pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 100;

/// Clamp a client-supplied limit into `[1, 100]`
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(MIN_LIMIT, MAX_LIMIT) as usize
}

// ============================================================================
// QUERY
// ============================================================================

/// A validated proximity request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub origin: GeoPoint,
    pub radius_km: f64,
    /// Already clamped
    pub limit: usize,
}

impl NearbyQuery {
    /// Query with default radius and limit. Rejects malformed coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        Ok(Self {
            origin: GeoPoint::new(lat, lon)?,
            radius_km: DEFAULT_RADIUS_KM,
            limit: clamp_limit(DEFAULT_LIMIT),
        })
    }

    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = clamp_limit(limit);
        self
    }

    /// Non-positive or non-finite radius matches nothing
    pub fn is_empty_radius(&self) -> bool {
        !self.radius_km.is_finite() || self.radius_km <= 0.0
    }
}

/// Rank candidates by exact distance: filter to the radius, stable sort
/// ascending, truncate to `limit`. Ties keep candidate order.
pub fn rank(
    origin: GeoPoint,
    radius_km: f64,
    limit: usize,
    candidates: Vec<PointOfInterest>,
) -> Vec<NearbyResult> {
    let mut ranked: Vec<NearbyResult> = candidates
        .into_iter()
        .filter_map(|poi| {
            let d = distance_km(origin, poi.location);
            (d <= radius_km).then(|| poi.into_result(d))
        })
        .collect();

    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(limit);
    ranked
}

// ============================================================================
// ENGINE
// ============================================================================

/// Shared, cloneable handle used by request handlers
#[derive(Clone)]
pub struct ProximityEngine {
    pool: SessionPool,
    max_radius_km: f64,
}

impl ProximityEngine {
    pub fn new(pool: SessionPool, max_radius_km: f64) -> Self {
        Self { pool, max_radius_km }
    }

    /// Build pool and engine from one config
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let pool = SessionPool::new(config)?;
        Ok(Self::new(pool, config.max_radius_km))
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// `find_nearby(lat, lon, radius_km, limit)` with the service defaults
    /// applied by the caller (10 km, 50).
    pub fn find_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: i64,
    ) -> Result<Vec<NearbyResult>> {
        let query = NearbyQuery::new(lat, lon)?
            .with_radius_km(radius_km)
            .with_limit(limit);
        self.find(&query)
    }

    pub fn find(&self, query: &NearbyQuery) -> Result<Vec<NearbyResult>> {
        if query.is_empty_radius() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let radius_km = query.radius_km.min(self.max_radius_km);
        if radius_km < query.radius_km {
            tracing::debug!(
                requested = query.radius_km,
                bounded = radius_km,
                "radius bounded server-side"
            );
        }

        let candidates = {
            let session = self.pool.acquire()?;
            store::candidates_within(&session, query.origin, radius_km * 1000.0)?
        };
        let candidate_count = candidates.len();

        let results = rank(query.origin, radius_km, query.limit, candidates);

        tracing::debug!(
            lat = query.origin.lat,
            lon = query.origin.lon,
            radius_km,
            limit = query.limit,
            candidates = candidate_count,
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "nearby query complete"
        );

        Ok(results)
    }

    pub fn probe_liveness(&self) -> Liveness {
        self.pool.probe_liveness()
    }
}
