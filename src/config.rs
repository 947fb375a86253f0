use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::common::constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_DATABASE_PATH, DEFAULT_HEADER_SCAN_LIMIT, DEFAULT_SENTINELS,
    DEFAULT_SOURCE_PATH, DEFAULT_YEAR_MAX, DEFAULT_YEAR_MIN,
};
use crate::common::error::{IgsError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ingest: IngestConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub source_path: PathBuf,
    /// Cell values treated as absent, compared trimmed and case-insensitively
    pub sentinels: Vec<String>,
    pub year_min: i32,
    pub year_max: i32,
    pub header_scan_limit: usize,
    /// When set, every load report is also written here as JSON
    pub report_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
            sentinels: DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect(),
            year_min: DEFAULT_YEAR_MIN,
            year_max: DEFAULT_YEAR_MAX,
            header_scan_limit: DEFAULT_HEADER_SCAN_LIMIT,
            report_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means any origin
    pub cors_origins: Vec<String>,
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 512,
        }
    }
}

impl AppConfig {
    /// Load `.env`, then the TOML file named by `IGS_CONFIG` (default
    /// `igs.toml`), then apply environment overrides. A missing file is not
    /// an error; a malformed one is.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let path = std::env::var("IGS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(Path::new(&path))?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            IgsError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("IGS_SOURCE_PATH") {
            self.ingest.source_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("IGS_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("IGS_PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| IgsError::Config(format!("IGS_PORT is not a valid port: {v}")))?;
        }
        if let Ok(v) = std::env::var("IGS_METRICS_ENABLED") {
            self.server.metrics_enabled = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.ingest.year_min > self.ingest.year_max {
            return Err(IgsError::Config(format!(
                "ingest.year_min ({}) is after ingest.year_max ({})",
                self.ingest.year_min, self.ingest.year_max
            )));
        }
        if self.ingest.header_scan_limit == 0 {
            return Err(IgsError::Config("ingest.header_scan_limit must be positive".into()));
        }
        Ok(())
    }
}
