//! Process-wide configuration.
//!
//! Built once at startup (defaults, then an optional YAML file, then the
//! environment), validated, and shared read-only as `Arc<PipelineConfig>`.

use crate::error::ConfigError;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use statlayer_storage::{DurableStore, PostgresStore, SqliteStore, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "STATLAYER_CONFIG";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://baseball.db";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Durable store connection string; absent selects the embedded store
    pub database_url: Option<String>,
    pub checkpoint_dir: PathBuf,
    pub export_dir: PathBuf,
    /// Max in-flight per-entity fetches in one fan-out
    pub fanout_concurrency: usize,
    /// Max layers fetched at once
    pub layer_concurrency: usize,
    pub request_timeout_secs: u64,
    pub layer_timeout_secs: u64,
    pub stats_api_url: String,
    pub savant_url: String,
    pub odds_api_url: String,
    pub odds_api_key: Option<String>,
    pub arsenal_dir: PathBuf,
    pub seasons: Vec<i32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            checkpoint_dir: PathBuf::from("checkpoints"),
            export_dir: PathBuf::from("exports"),
            fanout_concurrency: num_cpus::get().clamp(1, 4),
            layer_concurrency: 1,
            request_timeout_secs: 30,
            layer_timeout_secs: 900,
            stats_api_url: "https://statsapi.mlb.com".to_string(),
            savant_url: "https://baseballsavant.mlb.com".to_string(),
            odds_api_url: "https://api.the-odds-api.com".to_string(),
            odds_api_key: None,
            arsenal_dir: PathBuf::from("arsenal"),
            seasons: vec![chrono::Utc::now().year()],
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("checkpoint_dir", &self.checkpoint_dir)
            .field("export_dir", &self.export_dir)
            .field("fanout_concurrency", &self.fanout_concurrency)
            .field("layer_concurrency", &self.layer_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("layer_timeout_secs", &self.layer_timeout_secs)
            .field("stats_api_url", &self.stats_api_url)
            .field("savant_url", &self.savant_url)
            .field("odds_api_url", &self.odds_api_url)
            .field("odds_api_key", &self.odds_api_key.as_ref().map(|_| "<redacted>"))
            .field("arsenal_dir", &self.arsenal_dir)
            .field("seasons", &self.seasons)
            .finish()
    }
}

impl PipelineConfig {
    /// Load from `STATLAYER_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with an injectable environment.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Overlay environment variables on top of the current values.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = Some(v);
        }
        if let Some(v) = lookup("STATLAYER_CHECKPOINT_DIR") {
            self.checkpoint_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STATLAYER_EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STATLAYER_FANOUT_CONCURRENCY") {
            self.fanout_concurrency = parse_number("STATLAYER_FANOUT_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("STATLAYER_LAYER_CONCURRENCY") {
            self.layer_concurrency = parse_number("STATLAYER_LAYER_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("STATLAYER_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("STATLAYER_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("STATLAYER_LAYER_TIMEOUT_SECS") {
            self.layer_timeout_secs = parse_number("STATLAYER_LAYER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("STATLAYER_STATS_API_URL") {
            self.stats_api_url = v;
        }
        if let Some(v) = lookup("STATLAYER_SAVANT_URL") {
            self.savant_url = v;
        }
        if let Some(v) = lookup("STATLAYER_ODDS_API_URL") {
            self.odds_api_url = v;
        }
        if let Some(v) = lookup("ODDS_API_KEY") {
            self.odds_api_key = Some(v).filter(|k| !k.trim().is_empty());
        }
        if let Some(v) = lookup("STATLAYER_ARSENAL_DIR") {
            self.arsenal_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STATLAYER_SEASONS") {
            self.seasons = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_number("STATLAYER_SEASONS", s))
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fanout_concurrency == 0 {
            return Err(ConfigError::invalid(
                "fanout_concurrency",
                self.fanout_concurrency,
                "must be >= 1",
            ));
        }
        if self.layer_concurrency == 0 {
            return Err(ConfigError::invalid(
                "layer_concurrency",
                self.layer_concurrency,
                "must be >= 1",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                self.request_timeout_secs,
                "must be >= 1",
            ));
        }
        if self.layer_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "layer_timeout_secs",
                self.layer_timeout_secs,
                "must be >= 1",
            ));
        }
        if self.seasons.is_empty() {
            return Err(ConfigError::invalid("seasons", "[]", "at least one season required"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn layer_timeout(&self) -> Duration {
        Duration::from_secs(self.layer_timeout_secs)
    }

    pub fn store_backend(&self) -> StoreBackend {
        StoreBackend::from_url(self.database_url.as_deref())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw, e.to_string()))
}

/// Durable store selected by the connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite(PathBuf),
    Postgres(String),
}

impl StoreBackend {
    pub fn from_url(url: Option<&str>) -> Self {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        match url {
            Some(u) if u.starts_with("postgres://") || u.starts_with("postgresql://") => {
                StoreBackend::Postgres(u.to_string())
            }
            Some(u) => StoreBackend::Sqlite(PathBuf::from(
                u.strip_prefix("sqlite://").unwrap_or(u),
            )),
            None => StoreBackend::from_url(Some(DEFAULT_DATABASE_URL)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite(_) => "sqlite",
            StoreBackend::Postgres(_) => "postgres",
        }
    }

    pub async fn connect(&self) -> Result<Arc<dyn DurableStore>, StorageError> {
        match self {
            StoreBackend::Sqlite(path) => Ok(Arc::new(SqliteStore::new(path)?)),
            StoreBackend::Postgres(url) => Ok(Arc::new(PostgresStore::new(url).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::load_with(env(&[])).unwrap();
        assert!(config.fanout_concurrency >= 1);
        assert_eq!(config.layer_concurrency, 1);
        assert_eq!(config.store_backend(), StoreBackend::Sqlite("baseball.db".into()));
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::load_with(env(&[
            ("DATABASE_URL", "postgres://localhost/baseball"),
            ("STATLAYER_FANOUT_CONCURRENCY", "8"),
            ("STATLAYER_SEASONS", "2023, 2024"),
            ("ODDS_API_KEY", "secret-key"),
        ]))
        .unwrap();

        assert_eq!(config.fanout_concurrency, 8);
        assert_eq!(config.seasons, vec![2023, 2024]);
        assert_eq!(config.odds_api_key.as_deref(), Some("secret-key"));
        assert_eq!(
            config.store_backend(),
            StoreBackend::Postgres("postgres://localhost/baseball".into())
        );
    }

    #[test]
    fn test_yaml_then_env_precedence() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fanout_concurrency: 2\nlayer_concurrency: 3\nseasons: [2022]\ncheckpoint_dir: /tmp/ckpt"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = PipelineConfig::load_with(env(&[
            ("STATLAYER_CONFIG", path.as_str()),
            ("STATLAYER_LAYER_CONCURRENCY", "5"),
        ]))
        .unwrap();

        assert_eq!(config.fanout_concurrency, 2);
        assert_eq!(config.layer_concurrency, 5);
        assert_eq!(config.seasons, vec![2022]);
        assert_eq!(config.checkpoint_dir, PathBuf::from("/tmp/ckpt"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::load_with(env(&[("STATLAYER_FANOUT_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("fanout_concurrency"));

        let err = PipelineConfig::load_with(env(&[("STATLAYER_REQUEST_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        assert!(PipelineConfig::from_yaml_str("unknown_field: 1").is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = PipelineConfig::default();
        config.odds_api_key = Some("super-secret".to_string());
        config.database_url = Some("postgres://user:pw@host/db".to_string());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("pw@host"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            StoreBackend::from_url(Some("sqlite://data/stats.db")),
            StoreBackend::Sqlite("data/stats.db".into())
        );
        assert_eq!(
            StoreBackend::from_url(Some("local.db")),
            StoreBackend::Sqlite("local.db".into())
        );
        assert_eq!(
            StoreBackend::from_url(Some("postgresql://h/db")).name(),
            "postgres"
        );
        assert_eq!(StoreBackend::from_url(Some("  ")).name(), "sqlite");
    }
}
