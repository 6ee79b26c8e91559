// 📥 Seed importer - CSV → SQLite spatial store
// Enforces the WGS84 invariant at write time so the query path can trust every row

use crate::geo::GeoPoint;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One CSV row / one entity to seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRow {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub service_carwash: Option<bool>,
    #[serde(default)]
    pub service_food: Option<bool>,
    #[serde(default)]
    pub service_coffee: Option<bool>,
    #[serde(default)]
    pub service_shop: Option<bool>,
    #[serde(default)]
    pub opening_hours_display: Option<String>,
}

impl SeedRow {
    /// Bare entity at a location, no display fields
    pub fn at(id: i64, lat: f64, lon: f64) -> Self {
        Self {
            id,
            name: None,
            brand: None,
            address: None,
            lat,
            lon,
            service_carwash: None,
            service_food: None,
            service_coffee: None,
            service_shop: None,
            opening_hours_display: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Rows with invalid coordinates, never written
    pub rejected: usize,
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<SeedRow>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {:?}", csv_path))?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: SeedRow = result.context("Failed to deserialize point of interest")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Write rows in one transaction. Existing ids keep their location; only
/// display fields and attributes are refreshed.
pub fn insert_entities(conn: &Connection, rows: &[SeedRow]) -> Result<ImportSummary> {
    let tx = conn.unchecked_transaction()?;
    let mut summary = ImportSummary::default();

    {
        let mut exists = tx.prepare("SELECT 1 FROM points_of_interest WHERE id = ?1")?;
        let mut upsert = tx.prepare(
            "INSERT INTO points_of_interest (
                id, name, brand, address, lat, lon,
                service_carwash, service_food, service_coffee, service_shop,
                opening_hours_display
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                brand = excluded.brand,
                address = excluded.address,
                service_carwash = excluded.service_carwash,
                service_food = excluded.service_food,
                service_coffee = excluded.service_coffee,
                service_shop = excluded.service_shop,
                opening_hours_display = excluded.opening_hours_display",
        )?;

        for row in rows {
            if let Err(e) = GeoPoint::new(row.lat, row.lon) {
                tracing::warn!(id = row.id, error = %e, "rejecting row with invalid location");
                summary.rejected += 1;
                continue;
            }

            let existed = exists.exists(params![row.id])?;
            upsert.execute(params![
                row.id,
                row.name,
                row.brand,
                row.address,
                row.lat,
                row.lon,
                row.service_carwash,
                row.service_food,
                row.service_coffee,
                row.service_shop,
                row.opening_hours_display,
            ])?;

            if existed {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
        }
    }

    tx.commit()?;

    tracing::info!(
        inserted = summary.inserted,
        updated = summary.updated,
        rejected = summary.rejected,
        "seed import finished"
    );

    Ok(summary)
}
