//! Startup logging
//!
//! The subscriber is installed before configuration is read, filtered by
//! `RUST_LOG` or `info`, so config-resolution warnings are never lost. Once
//! the config is loaded its `[logging] level` replaces that filter, unless
//! `RUST_LOG` was set.

use provtrust_common::{Error, Result};
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Level used until the configured one is known
pub const STARTUP_LEVEL: &str = "info";

pub type FilterLayer = reload::Layer<EnvFilter, Registry>;

/// Handle for swapping in the configured level after startup
#[derive(Clone)]
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

/// Reloadable filter layer for the root of the subscriber stack
pub fn startup_filter() -> (FilterLayer, LogLevelHandle) {
    let (filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(STARTUP_LEVEL), false),
    };
    let (layer, handle) = reload::Layer::new(filter);
    (
        layer,
        LogLevelHandle {
            handle,
            env_override,
        },
    )
}

impl LogLevelHandle {
    /// Replace the startup filter with `level`
    ///
    /// # Returns
    /// `false` when `RUST_LOG` is set and keeps precedence
    ///
    /// # Errors
    /// `Error::Config` for an unparseable level directive
    pub fn apply_configured_level(&self, level: &str) -> Result<bool> {
        if self.env_override {
            return Ok(false);
        }
        let filter = EnvFilter::try_new(level)
            .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", level, e)))?;
        self.handle
            .reload(filter)
            .map_err(|e| Error::Internal(format!("Failed to apply log level: {}", e)))?;
        Ok(true)
    }
}
