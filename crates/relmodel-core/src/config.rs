//! Runtime configuration
//!
//! ```toml
//! match_threshold = 0.6
//!
//! [logging]
//! profile = "production"
//! filter = "relmodel_core=trace"
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::errors::{ModelError, Result};
use crate::logging_facility::{init_with_filter, Profile};

/// Default acceptance threshold for list reconciliation
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Logging section of the runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub profile: Profile,
    /// EnvFilter directive overriding the profile default
    pub filter: Option<String>,
}

/// Settings shared by every operation on a graph
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Pairs at or above this distance are never matched during reconciliation
    pub match_threshold: f64,
    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Config` on malformed TOML, unknown keys or
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(text).map_err(|e| ModelError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Config` if the file cannot be read or is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ModelError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Config` if `match_threshold` is outside (0, 1].
    pub fn validate(&self) -> Result<()> {
        let t = self.match_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ModelError::Config {
                message: format!("match_threshold must be in (0, 1], got {}", t),
            });
        }
        Ok(())
    }

    /// Initialize the logging facility from the `logging` section
    pub fn init_logging(&self) {
        init_with_filter(self.logging.profile, self.logging.filter.as_deref());
    }
}
