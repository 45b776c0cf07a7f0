//! Configuration for the movie identifier.
//!
//! Every section has defaults, so a config file only needs the keys it
//! changes. A minimal file is just:
//!
//! ```toml
//! [tmdb]
//! api_key = "..."
//! ```
//!
//! Relative paths are resolved against the data directory.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `tmdb.api_key`
pub const API_KEY_ENV: &str = "TMDB_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub tmdb: TmdbConfig,
    pub identification: IdentificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Library data root; artwork and the database live below it
    pub root_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "library.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
    /// trace, debug, info, warn or error
    pub default_level: String,
    pub console: bool,
    pub file: bool,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            default_level: "info".to_string(),
            console: true,
            file: true,
            json_format: false,
        }
    }
}

/// TMDb API and image CDN settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    pub base_url: String,

    /// v3 API key; [`API_KEY_ENV`] takes precedence when set
    pub api_key: String,

    /// Prefix joined with a record's poster path
    pub poster_base_url: String,

    /// Prefix joined with a record's backdrop path
    pub backdrop_base_url: String,

    pub rate_limit: RateLimitConfig,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: String::new(),
            poster_base_url: "https://image.tmdb.org/t/p/w500".to_string(),
            backdrop_base_url: "https://image.tmdb.org/t/p/w1280".to_string(),
            rate_limit: RateLimitConfig::default(),
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 4.0,
            requests_per_minute: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationConfig {
    /// ISO 639-1 language requested for fetched metadata
    pub language: String,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            tracing::info!(path = %path.display(), "Configuration loaded");
            config
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.apply_api_key(key);
        }

        Ok(config)
    }

    fn apply_api_key(&mut self, key: String) {
        let key = key.trim();
        if !key.is_empty() {
            self.tmdb.api_key = key.to_string();
        }
    }

    /// The TMDb API key, or an error naming where to set it.
    ///
    /// Lookups without a key resolve nothing, so batches must not start.
    pub fn require_api_key(&self) -> Result<&str> {
        let key = self.tmdb.api_key.trim();
        if key.is_empty() {
            bail!(
                "No TMDb API key configured; set tmdb.api_key in the config file or the {} environment variable",
                API_KEY_ENV
            );
        }
        Ok(key)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database.path)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}
