// ⚙️ Store configuration - resolved once at startup, immutable afterwards
//
// Each setting NAME is looked up as:
//   1. contents of the file named by NAME_FILE (mounted secrets)
//   2. the NAME variable itself
//   3. the built-in default

use crate::error::{NearbyError, Result};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "nearby.db";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_MAX_OVERFLOW: u32 = 10;
pub const DEFAULT_MAX_RADIUS_KM: f64 = 500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// SQLite database file holding the spatial store
    pub database_path: PathBuf,

    /// Steady-state concurrent connections
    pub pool_size: u32,

    /// Extra transient connections allowed under burst load
    pub max_overflow: u32,

    /// How long `SessionPool::acquire` waits before `PoolExhausted`
    pub acquire_timeout: Duration,

    /// Per-session statement deadline, also used as the busy timeout
    pub statement_timeout: Duration,

    /// Idle overflow connections are closed after this long
    pub overflow_idle_timeout: Duration,

    /// Discard session-local cached state when a session is returned
    pub expire_on_release: bool,

    /// Server-side upper bound for `radius_km`
    pub max_radius_km: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_POOL_SIZE,
            max_overflow: DEFAULT_MAX_OVERFLOW,
            acquire_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(5),
            overflow_idle_timeout: Duration::from_secs(30),
            expire_on_release: true,
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
        }
    }
}

impl StoreConfig {
    /// Config for a given database file, everything else default
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Build from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map here)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |name: &str| resolve_setting(&lookup, name);
        let defaults = Self::default();

        let config = Self {
            database_path: resolve("DB_PATH")?
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            pool_size: parse_or(resolve("DB_POOL_SIZE")?, "DB_POOL_SIZE", defaults.pool_size)?,
            max_overflow: parse_or(
                resolve("DB_MAX_OVERFLOW")?,
                "DB_MAX_OVERFLOW",
                defaults.max_overflow,
            )?,
            acquire_timeout: parse_or(
                resolve("DB_ACQUIRE_TIMEOUT_MS")?,
                "DB_ACQUIRE_TIMEOUT_MS",
                defaults.acquire_timeout.as_millis() as u64,
            )
            .map(Duration::from_millis)?,
            statement_timeout: parse_or(
                resolve("DB_STATEMENT_TIMEOUT_MS")?,
                "DB_STATEMENT_TIMEOUT_MS",
                defaults.statement_timeout.as_millis() as u64,
            )
            .map(Duration::from_millis)?,
            overflow_idle_timeout: defaults.overflow_idle_timeout,
            expire_on_release: parse_or(
                resolve("DB_EXPIRE_ON_RELEASE")?,
                "DB_EXPIRE_ON_RELEASE",
                defaults.expire_on_release,
            )?,
            max_radius_km: parse_or(
                resolve("NEARBY_MAX_RADIUS_KM")?,
                "NEARBY_MAX_RADIUS_KM",
                defaults.max_radius_km,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(NearbyError::Config("pool_size must be > 0".to_string()));
        }
        if self.pool_size.checked_add(self.max_overflow).is_none() {
            return Err(NearbyError::Config(format!(
                "pool_size + max_overflow exceeds {}",
                u32::MAX
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(NearbyError::Config(
                "acquire_timeout must be > 0".to_string(),
            ));
        }
        if self.statement_timeout.is_zero() {
            return Err(NearbyError::Config(
                "statement_timeout must be > 0".to_string(),
            ));
        }
        if !self.max_radius_km.is_finite() || self.max_radius_km <= 0.0 {
            return Err(NearbyError::Config(format!(
                "max_radius_km must be a positive number, got {}",
                self.max_radius_km
            )));
        }
        if !self.expire_on_release {
            return Err(NearbyError::Config(
                "expire_on_release must be enabled; sessions may not carry cached state across requests"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Upper bound on simultaneously open connections
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }
}

/// Resolve NAME via NAME_FILE first, then NAME. Values are trimmed.
fn resolve_setting<F>(lookup: &F, name: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(file) = lookup(&format!("{}_FILE", name)) {
        let path = PathBuf::from(file.trim());
        if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                NearbyError::Config(format!("cannot read {}_FILE {:?}: {}", name, path, e))
            })?;
            return Ok(Some(contents.trim().to_string()));
        }
    }

    Ok(lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| NearbyError::Config(format!("{} has invalid value {:?}", name, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = StoreConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.max_connections(), 20);
    }

    #[test]
    fn test_env_values_parsed() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("DB_PATH", "/data/poi.db"),
            ("DB_POOL_SIZE", "4"),
            ("DB_MAX_OVERFLOW", "2"),
            ("DB_ACQUIRE_TIMEOUT_MS", "250"),
            ("NEARBY_MAX_RADIUS_KM", "50"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/poi.db"));
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.max_overflow, 2);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.max_radius_km, 50.0);
    }

    #[test]
    fn test_file_override_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "/secrets/mounted.db").unwrap();
        let file_path = file.path().to_string_lossy().to_string();

        let config = StoreConfig::from_lookup(lookup_from(&[
            ("DB_PATH", "/from/env.db"),
            ("DB_PATH_FILE", file_path.as_str()),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/secrets/mounted.db"));
    }

    #[test]
    fn test_missing_override_file_falls_back_to_env() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("DB_PATH", "/from/env.db"),
            ("DB_PATH_FILE", "/does/not/exist"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/from/env.db"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_number = StoreConfig::from_lookup(lookup_from(&[("DB_POOL_SIZE", "ten")]));
        assert!(matches!(bad_number, Err(NearbyError::Config(_))));

        let zero_pool = StoreConfig::from_lookup(lookup_from(&[("DB_POOL_SIZE", "0")]));
        assert!(matches!(zero_pool, Err(NearbyError::Config(_))));

        let no_expire =
            StoreConfig::from_lookup(lookup_from(&[("DB_EXPIRE_ON_RELEASE", "false")]));
        assert!(matches!(no_expire, Err(NearbyError::Config(_))));

        let no_deadline =
            StoreConfig::from_lookup(lookup_from(&[("DB_STATEMENT_TIMEOUT_MS", "0")]));
        assert!(matches!(no_deadline, Err(NearbyError::Config(_))));
    }

    #[test]
    fn test_connection_total_must_fit() {
        let huge = StoreConfig::from_lookup(lookup_from(&[("DB_POOL_SIZE", "4294967295")]));
        assert!(matches!(huge, Err(NearbyError::Config(_))), "{:?}", huge);

        let config = StoreConfig {
            pool_size: u32::MAX,
            max_overflow: 1,
            ..StoreConfig::default()
        };
        assert_eq!(config.max_connections(), u32::MAX);
        assert!(crate::pool::SessionPool::new(&config).is_err());
    }
}
