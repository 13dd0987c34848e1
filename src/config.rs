//! Configuration management for elcom-tariffs
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{Result, TariffError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod defaults;

pub use defaults::{DEFAULT_ENDPOINT, DEFAULT_NAMED_GRAPH, DEFAULT_UPDATE_INTERVAL_HOURS};

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "ELCOM_TARIFFS_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// SPARQL endpoint connection settings
    pub endpoint: EndpointConfig,

    /// Configured municipality/year entities, one refresh task each
    pub entities: Vec<EntityConfig>,

    /// Tariff profile tags in descending priority (e.g. household before business)
    pub profile_priority: Vec<String>,

    /// Predicate discovery tuning
    pub discovery: DiscoveryConfig,

    /// Refresh retry and result shaping
    pub refresh: RefreshConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// SPARQL endpoint connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EndpointConfig {
    /// Query URL (HTTP POST, SPARQL query body)
    pub url: String,

    /// Named graph holding the tariff cube; empty means default graph
    pub named_graph: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// One tariff entity: a municipality and year refreshed on an interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityConfig {
    /// Stable identifier used by the web surface
    pub id: String,

    /// Graph identifier of the municipality
    pub municipality_uri: String,

    /// Display label of the municipality
    #[serde(default)]
    pub municipality_label: String,

    /// Tariff year
    pub year: i32,

    /// Refresh interval in hours
    #[serde(default = "defaults::default_update_interval_hours")]
    pub update_interval_hours: u32,
}

/// Predicate discovery tuning
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Maximum sampled triples per discovery run
    pub sample_limit: u32,

    /// Minimum confidence (0..1) for a predicate to win a role
    pub min_confidence: f64,

    /// How long a discovered schema may be reused (hours, 0 = always rediscover)
    pub schema_cache_hours: u32,

    /// Maximum triples fetched per observation query
    pub fetch_limit: u32,
}

/// Refresh retry and result shaping
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RefreshConfig {
    /// Retries after a transport failure before the cycle fails
    pub max_retries: u32,

    /// Initial backoff between retries in milliseconds (doubles per attempt)
    pub retry_backoff_ms: u64,

    /// Maximum observation ids carried in a result
    pub raw_observation_cap: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (or directory)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WebConfig {
    /// Serve the HTTP surface
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first existing default location,
    /// apply environment overrides and validate
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::load_from_default_paths()?,
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_default_paths() -> Result<Self> {
        let default_paths = [
            "elcom_tariffs.yaml",
            "/data/elcom_tariffs.yaml",
            "/etc/elcom-tariffs/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Override the first entity from environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let uri = std::env::var("ELCOM_TARIFFS_MUNICIPALITY_URI").ok();
        let year = std::env::var("ELCOM_TARIFFS_YEAR").ok();
        let hours = std::env::var("ELCOM_TARIFFS_UPDATE_INTERVAL_HOURS").ok();
        if uri.is_none() && year.is_none() && hours.is_none() {
            return Ok(());
        }

        if self.entities.is_empty() {
            self.entities.push(EntityConfig {
                id: "default".to_string(),
                municipality_uri: String::new(),
                municipality_label: String::new(),
                year: chrono::Datelike::year(&chrono::Utc::now()),
                update_interval_hours: DEFAULT_UPDATE_INTERVAL_HOURS,
            });
        }
        let Some(entity) = self.entities.first_mut() else {
            return Ok(());
        };

        if let Some(uri) = uri {
            entity.municipality_uri = uri.trim().to_string();
        }
        if let Some(year) = year {
            entity.year = year.trim().parse().map_err(|_| {
                TariffError::validation("ELCOM_TARIFFS_YEAR", "must be an integer year")
            })?;
        }
        if let Some(hours) = hours {
            entity.update_interval_hours = hours.trim().parse().map_err(|_| {
                TariffError::validation(
                    "ELCOM_TARIFFS_UPDATE_INTERVAL_HOURS",
                    "must be a positive integer",
                )
            })?;
        }
        Ok(())
    }

    /// Find an entity by id
    pub fn entity(&self, id: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.url.trim().is_empty() {
            return Err(TariffError::validation(
                "endpoint.url",
                "Endpoint URL cannot be empty",
            ));
        }

        if self.endpoint.timeout_secs == 0 || self.endpoint.timeout_secs > 120 {
            return Err(TariffError::validation(
                "endpoint.timeout_secs",
                "Must be between 1 and 120",
            ));
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            entity.validate()?;
            if !seen.insert(entity.id.as_str()) {
                return Err(TariffError::validation(
                    "entities.id".to_string(),
                    format!("Duplicate entity id '{}'", entity.id),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.discovery.min_confidence) {
            return Err(TariffError::validation(
                "discovery.min_confidence",
                "Must be within 0..1",
            ));
        }

        if self.discovery.sample_limit == 0 {
            return Err(TariffError::validation(
                "discovery.sample_limit",
                "Must be greater than 0",
            ));
        }

        if self.discovery.fetch_limit == 0 {
            return Err(TariffError::validation(
                "discovery.fetch_limit",
                "Must be greater than 0",
            ));
        }

        if self.refresh.raw_observation_cap > 100 {
            return Err(TariffError::validation(
                "refresh.raw_observation_cap",
                "Must not exceed 100",
            ));
        }

        Ok(())
    }
}

impl EntityConfig {
    /// Validate a single entity
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(TariffError::validation("entities.id", "Id cannot be empty"));
        }

        if self.municipality_uri.trim().is_empty() {
            return Err(TariffError::validation(
                "entities.municipality_uri".to_string(),
                format!("Entity '{}' has no municipality URI", self.id),
            ));
        }

        if !(2000..=2100).contains(&self.year) {
            return Err(TariffError::validation(
                "entities.year".to_string(),
                format!("Year {} outside 2000..=2100", self.year),
            ));
        }

        if self.update_interval_hours == 0 {
            return Err(TariffError::validation(
                "entities.update_interval_hours",
                "Must be at least 1",
            ));
        }

        Ok(())
    }

    /// Label used for display, falling back to the URI
    pub fn display_label(&self) -> &str {
        if self.municipality_label.trim().is_empty() {
            &self.municipality_uri
        } else {
            &self.municipality_label
        }
    }
}
