// 🗄️ Spatial Store - SQLite table + R*Tree index
// The query path only reads; schema setup is shared with the importer and tests

use crate::entity::{Attributes, PointOfInterest};
use crate::error::Result;
use crate::geo::{BoundingBox, GeoPoint};
use rusqlite::{params_from_iter, Connection, Row};

/// Columns every candidate row carries, in `row_to_entity` order
const CANDIDATE_COLUMNS: &str = "p.id AS id, p.name, p.brand, p.address, p.lat, p.lon,
        p.service_carwash, p.service_food, p.service_coffee, p.service_shop,
        p.opening_hours_display";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode so readers never block behind the importer
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Points of interest (location is immutable and always valid WGS84)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS points_of_interest (
            id INTEGER PRIMARY KEY,
            name TEXT,
            brand TEXT,
            address TEXT,
            lat REAL NOT NULL CHECK (lat BETWEEN -90.0 AND 90.0),
            lon REAL NOT NULL CHECK (lon BETWEEN -180.0 AND 180.0),
            service_carwash INTEGER,
            service_food INTEGER,
            service_coffee INTEGER,
            service_shop INTEGER,
            opening_hours_display TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Spatial index: one degenerate box per point
    // ==========================================================================
    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS poi_index USING rtree(
            id, min_lat, max_lat, min_lon, max_lon
        )",
        [],
    )?;

    conn.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS poi_index_insert
         AFTER INSERT ON points_of_interest
         BEGIN
            INSERT INTO poi_index (id, min_lat, max_lat, min_lon, max_lon)
            VALUES (new.id, new.lat, new.lat, new.lon, new.lon);
         END;

         CREATE TRIGGER IF NOT EXISTS poi_index_update
         AFTER UPDATE OF lat, lon ON points_of_interest
         BEGIN
            UPDATE poi_index
            SET min_lat = new.lat, max_lat = new.lat, min_lon = new.lon, max_lon = new.lon
            WHERE id = new.id;
         END;

         CREATE TRIGGER IF NOT EXISTS poi_index_delete
         AFTER DELETE ON points_of_interest
         BEGIN
            DELETE FROM poi_index WHERE id = old.id;
         END;",
    )?;

    Ok(())
}

/// Range-query primitive: every entity whose indexed box intersects the
/// bounding box of `radius_m` around `center`.
///
/// The result is a superset of the entities within the radius. Rows come back
/// in `id` order, not by distance; ranking belongs to the engine.
pub fn candidates_within(
    conn: &Connection,
    center: GeoPoint,
    radius_m: f64,
) -> Result<Vec<PointOfInterest>> {
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return Ok(Vec::new());
    }

    let bbox = BoundingBox::around(center, radius_m / 1000.0);
    let sql = candidate_sql(bbox.lon_ranges.len());

    let mut bounds = vec![bbox.min_lat, bbox.max_lat];
    for range in &bbox.lon_ranges {
        bounds.push(range.min_lon);
        bounds.push(range.max_lon);
    }

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bounds.iter()), row_to_entity)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Number of stored entities
pub fn count_entities(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM points_of_interest", [], |row| row.get(0))?;

    Ok(count)
}

/// One SELECT per longitude range, unioned into a single statement
fn candidate_sql(lon_ranges: usize) -> String {
    let blocks: Vec<String> = (0..lon_ranges)
        .map(|i| {
            let lo = 3 + i * 2;
            let hi = lo + 1;
            format!(
                "SELECT {CANDIDATE_COLUMNS}
                 FROM poi_index i
                 JOIN points_of_interest p ON p.id = i.id
                 WHERE i.max_lat >= ?1 AND i.min_lat <= ?2
                   AND i.max_lon >= ?{lo} AND i.min_lon <= ?{hi}"
            )
        })
        .collect();

    format!("{} ORDER BY id", blocks.join(" UNION ALL "))
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<PointOfInterest> {
    Ok(PointOfInterest {
        id: row.get(0)?,
        name: row.get(1)?,
        brand: row.get(2)?,
        address: row.get(3)?,
        location: GeoPoint {
            lat: row.get(4)?,
            lon: row.get(5)?,
        },
        attributes: Attributes {
            service_carwash: row.get(6)?,
            service_food: row.get(7)?,
            service_coffee: row.get(8)?,
            service_shop: row.get(9)?,
            opening_hours_display: row.get(10)?,
        },
    })
}
