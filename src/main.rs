use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use nearby_poi::{
    count_entities, init_tracing, insert_entities, load_csv, setup_database, Liveness,
    ProximityEngine, StoreConfig, DEFAULT_LIMIT, DEFAULT_RADIUS_KM,
};

#[derive(Parser, Debug)]
#[command(name = "nearby-poi", about = "Points of interest near a location", version)]
struct Cli {
    /// SQLite store path (overrides DB_PATH / DB_PATH_FILE)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a CSV of points of interest into the store (creates the schema)
    Import { csv: PathBuf },

    /// Find points of interest around a location
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, default_value_t = DEFAULT_RADIUS_KM)]
        km: f64,
        #[arg(long, default_value_t = DEFAULT_LIMIT, allow_negative_numbers = true)]
        limit: i64,
    },

    /// Probe store liveness
    Health,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env().context("Failed to build store configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Command::Import { csv } => run_import(&config, &csv),
        Command::Nearby { lat, lon, km, limit } => run_nearby(&config, lat, lon, km, limit),
        Command::Health => run_health(&config),
    }
}

fn run_import(config: &StoreConfig, csv_path: &Path) -> Result<()> {
    println!("🗄️  Import: CSV → SQLite + R*Tree");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let rows = load_csv(csv_path)?;
    println!("✓ Loaded {} rows from {:?}", rows.len(), csv_path);

    println!("\n🔧 Setting up database...");
    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {:?}", config.database_path))?;
    setup_database(&conn)?;
    println!("✓ Schema and spatial index ready");

    println!("\n💾 Inserting points of interest...");
    let summary = insert_entities(&conn, &rows)?;
    println!("✓ Inserted: {}", summary.inserted);
    println!("✓ Updated:  {}", summary.updated);
    if summary.rejected > 0 {
        println!("⚠️  Rejected (invalid location): {}", summary.rejected);
    }

    let count = count_entities(&conn)?;
    println!("\n✅ Store contains {} points of interest", count);

    Ok(())
}

fn run_nearby(config: &StoreConfig, lat: f64, lon: f64, km: f64, limit: i64) -> Result<()> {
    let engine = ProximityEngine::from_config(config)?;
    let results = engine.find_nearby(lat, lon, km, limit)?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn run_health(config: &StoreConfig) -> Result<()> {
    let engine = ProximityEngine::from_config(config)?;
    let liveness = engine.probe_liveness();

    println!("{}", serde_json::to_string(&liveness)?);
    if let Liveness::Degraded { .. } = liveness {
        std::process::exit(1);
    }
    Ok(())
}
