//! Per-process session configuration.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum number of page containers the write cache keeps in memory.
const MIN_CACHE_CAPACITY: usize = 1;

/// Session configuration: where a storage lives and how it is used.
///
/// The location doubles as the key under which I/O factories are registered.
///
/// # Validation Rules
///
/// - `location` must not be empty
/// - `cache_capacity` must be >= 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionConfig {
    /// Storage directory.
    pub location: PathBuf,
    /// Page containers kept in memory by a write transaction before spilling.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

#[bon::bon]
impl SessionConfig {
    /// Creates a new session configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the location is empty or
    /// `cache_capacity` is 0.
    #[builder]
    pub fn new(
        #[builder(into)] location: PathBuf,
        #[builder(default = default_cache_capacity())] cache_capacity: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { location, cache_capacity };
        config.validate()?;
        Ok(config)
    }
}

impl SessionConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: "location must not be empty".to_string(),
            });
        }
        if self.cache_capacity < MIN_CACHE_CAPACITY {
            return Err(ConfigError::Validation {
                message: format!(
                    "cache_capacity must be >= {}, got {}",
                    MIN_CACHE_CAPACITY, self.cache_capacity
                ),
            });
        }
        Ok(())
    }
}

fn default_cache_capacity() -> usize {
    64
}
