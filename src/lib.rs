// Nearby POI - Core Library
// Geospatial proximity queries over a pooled SQLite/R*Tree store

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod geo;
pub mod import;
pub mod pool;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::StoreConfig;
pub use engine::{clamp_limit, rank, NearbyQuery, ProximityEngine, DEFAULT_LIMIT, DEFAULT_RADIUS_KM};
pub use entity::{Attributes, NearbyResult, PointOfInterest};
pub use error::{NearbyError, Result};
pub use geo::{distance_km, BoundingBox, GeoPoint, EARTH_RADIUS_KM};
pub use import::{insert_entities, load_csv, ImportSummary, SeedRow};
pub use pool::{Liveness, PoolStats, Session, SessionPool};
pub use store::{candidates_within, count_entities, setup_database};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by both binaries (`RUST_LOG`, default `info`)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
