//! Configuration loading and config-file resolution
//!
//! Resolution priority for the config file:
//! 1. Command-line argument (highest priority)
//! 2. `PROVTRUST_CONFIG` environment variable
//! 3. `<config_dir>/provtrust/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file is never fatal: the resolver warns and falls back to
//! compiled defaults. A file that exists but does not parse is an error.
//!
//! Scoring weights and status thresholds are policy constants in the engine
//! and have no configuration keys.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PROVTRUST_CONFIG";

/// Top-level TOML configuration
///
/// Every section is optional; absent keys take their compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// `[logging]` section
    pub logging: LoggingConfig,
    /// `[pipeline]` section
    pub pipeline: PipelineConfig,
    /// `[endpoints]` section
    pub endpoints: EndpointConfig,
    /// `[impact]` section
    pub impact: ImpactConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info", "provtrust_engine=debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Pipeline execution limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on any single external lookup
    pub lookup_timeout_ms: u64,
    /// Minimum spacing between record starts within a batch
    pub record_pacing_ms: u64,
    /// Records processed concurrently within a batch
    pub max_concurrent_records: usize,
    /// Event bus buffer size
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 15_000,
            record_pacing_ms: 500,
            max_concurrent_records: 4,
            event_capacity: 256,
        }
    }
}

impl PipelineConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn record_pacing(&self) -> Duration {
        Duration::from_millis(self.record_pacing_ms)
    }

    /// Reject limits that would stall the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.lookup_timeout_ms == 0 {
            return Err(Error::Config(
                "pipeline.lookup_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_records == 0 {
            return Err(Error::Config(
                "pipeline.max_concurrent_records must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config(
                "pipeline.event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Base URLs of the public lookup services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// NPPES NPI registry API
    pub registry_url: String,
    /// Census one-line address geocoder
    pub geocoder_url: String,
    /// CMS Medicare provider utilization dataset
    pub billing_url: String,
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Per-client request quota
    pub requests_per_second: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://npiregistry.cms.hhs.gov/api/".to_string(),
            geocoder_url:
                "https://geocoding.geo.census.gov/geocoder/addresses/onelineaddress".to_string(),
            billing_url: "https://data.cms.gov/data-api/v1/dataset/3614a599-919b-4534-ac94-3e7c18cc3b22/data"
                .to_string(),
            user_agent: get_user_agent(),
            requests_per_second: 5,
        }
    }
}

/// Batch ROI projection assumptions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImpactConfig {
    /// Reference payer network size used to annualize batch savings
    pub network_size: u32,
    /// Annual platform cost (USD) used for ROI percentage
    pub annual_platform_cost: f64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            network_size: 10_000,
            annual_platform_cost: 250_000.0,
        }
    }
}

/// Standard User-Agent for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!("provtrust/{}", env!("CARGO_PKG_VERSION"))
}

/// Platform config file location: `<config_dir>/provtrust/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("provtrust").join("config.toml"))
}

/// Parse a TOML config file
///
/// # Errors
/// - `Error::Io` if the file cannot be read
/// - `Error::Config` if the contents are not valid configuration
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.pipeline.validate()?;
    Ok(config)
}

/// Config file resolver following the CLI → ENV → platform file → defaults order
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Locate the config file to load, if any
    ///
    /// Returns the first candidate by priority without checking existence
    /// for explicit (CLI/ENV) paths, so that a typo is reported as a warning
    /// instead of silently skipping to the platform file.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config file (only if present)
        default_config_path().filter(|p| p.exists())
    }

    /// Load configuration, falling back to compiled defaults
    ///
    /// # Errors
    /// Returns `Error::Config` only when a config file exists but is invalid.
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.resolve_path() else {
            info!("No config file found, using compiled defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!(
                "Config file {} does not exist, using compiled defaults",
                path.display()
            );
            return Ok(TomlConfig::default());
        }

        let config = load_toml_config(&path)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }
}
