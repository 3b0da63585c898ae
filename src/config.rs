use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub geocoder: GeocoderConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Sqlite,
    Postgresql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseType,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default)]
    pub postgresql_url: Option<String>,

    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_sqlite_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("veterimap")
        .join("veterimap.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseType::default(),
            sqlite_path: default_sqlite_path(),
            postgresql_url: None,
            pool: PoolConfig::default(),
        }
    }
}

/// PostgreSQL connection pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_max_size")]
    pub max_size: u32,

    #[serde(default = "default_pool_min_idle")]
    pub min_idle: u32,

    #[serde(default = "default_pool_max_lifetime_secs")]
    pub max_lifetime_secs: u64,

    #[serde(default = "default_pool_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_pool_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

fn default_pool_max_size() -> u32 {
    25
}

fn default_pool_min_idle() -> u32 {
    5
}

fn default_pool_max_lifetime_secs() -> u64 {
    3600
}

fn default_pool_idle_timeout_secs() -> u64 {
    1800
}

fn default_pool_connection_timeout_secs() -> u64 {
    10
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_pool_max_size(),
            min_idle: default_pool_min_idle(),
            max_lifetime_secs: default_pool_max_lifetime_secs(),
            idle_timeout_secs: default_pool_idle_timeout_secs(),
            connection_timeout_secs: default_pool_connection_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_geocoder_endpoint")]
    pub endpoint: String,

    /// Sent with every request. The public Nominatim instance rejects anonymous clients.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_geocoder_timeout")]
    pub timeout_secs: u64,
}

fn default_geocoder_endpoint() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    "Veterimap-App-Production-v1".to_string()
}

fn default_geocoder_timeout() -> u64 {
    10
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geocoder_endpoint(),
            user_agent: default_user_agent(),
            timeout_secs: default_geocoder_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Minimum time between the start of two lookups.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Extra pause after a failed lookup.
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

fn default_batch_size() -> u32 {
    100
}

fn default_request_interval_ms() -> u64 {
    1200
}

fn default_failure_backoff_ms() -> u64 {
    1000
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            request_interval_ms: default_request_interval_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files. Logs go to stderr when unset and journald is unavailable.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load from `path`, or from the default location when `None`, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a TOML file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// `DB_URL` switches to PostgreSQL, `PORT` overrides the listening port.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("DB_URL").filter(|u| !u.trim().is_empty()) {
            self.database.backend = DatabaseType::Postgresql;
            self.database.postgresql_url = Some(url);
        }

        if let Some(port) = var("PORT").filter(|p| !p.trim().is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {:?}", port))?;
            let host = self
                .server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.bind = format!("{}:{}", host, port);
        }

        Ok(())
    }

    /// `VETERIMAP_CONFIG` if set, else the per-user config directory.
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os("VETERIMAP_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("veterimap")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.backend, DatabaseType::Sqlite);
        assert_eq!(config.database.pool.max_size, 25);
        assert_eq!(config.database.pool.min_idle, 5);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.geocoder.timeout_secs, 10);
        assert_eq!(config.backfill.batch_size, 100);
        assert_eq!(config.backfill.request_interval_ms, 1200);
        assert_eq!(config.backfill.failure_backoff_ms, 1000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.backfill.batch_size, 100);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [database]
            backend = "postgresql"
            postgresql_url = "postgres://vet@localhost/veterimap"

            [database.pool]
            max_size = 8

            [backfill]
            batch_size = 20
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.database.backend, DatabaseType::Postgresql);
        assert_eq!(config.database.pool.max_size, 8);
        assert_eq!(config.database.pool.idle_timeout_secs, 1800);
        assert_eq!(config.backfill.batch_size, 20);
        assert_eq!(config.backfill.request_interval_ms, 1200);
        assert_eq!(config.geocoder.user_agent, "Veterimap-App-Production-v1");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backfill]\nbatch_size = \"many\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("DB_URL", "postgres://localhost/vets"), ("PORT", "9090")]))
            .unwrap();
        assert_eq!(config.database.backend, DatabaseType::Postgresql);
        assert_eq!(
            config.database.postgresql_url.as_deref(),
            Some("postgres://localhost/vets")
        );
        assert_eq!(config.server.bind, "0.0.0.0:9090");

        let mut config = Config::default();
        config.apply_env(env(&[])).unwrap();
        assert_eq!(config.database.backend, DatabaseType::Sqlite);

        assert!(Config::default().apply_env(env(&[("PORT", "http")])).is_err());
    }
}
