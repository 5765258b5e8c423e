//! Storage configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::page::MAX_PAGE_CAPACITY;

/// Records per page unless configured otherwise.
pub const DEFAULT_PAGE_CAPACITY: u32 = 16_384;

/// Environment variable overriding [`StorageConfig::page_capacity`].
pub const PAGE_CAPACITY_ENV: &str = "ENGINE_PAGE_CAPACITY";

/// Configuration shared by every pool of a [`World`](crate::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Number of records in each page. Pages never move or shrink, so this
    /// is the granularity at which a pool grows.
    pub page_capacity: u32,
}

impl StorageConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_capacity: DEFAULT_PAGE_CAPACITY,
        }
    }

    /// Override the page capacity.
    #[must_use]
    pub fn with_page_capacity(mut self, page_capacity: u32) -> Self {
        self.page_capacity = page_capacity;
        self
    }

    /// Build a config from defaults overridden by the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `ENGINE_PAGE_CAPACITY` is set but not a valid
    /// capacity.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new().with_env_override(std::env::var(PAGE_CAPACITY_ENV).ok())
    }

    fn with_env_override(self, value: Option<String>) -> Result<Self, ConfigError> {
        let Some(value) = value else {
            return Ok(self);
        };
        let page_capacity = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv {
                var: PAGE_CAPACITY_ENV,
                value: value.clone(),
            })?;
        let config = self.with_page_capacity(page_capacity);
        config.validate()?;
        Ok(config)
    }

    /// Check that the config describes usable pools.
    ///
    /// # Errors
    ///
    /// Returns an error if the page capacity is zero or collides with the
    /// slot header sentinels.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_capacity == 0 {
            return Err(ConfigError::ZeroPageCapacity);
        }
        if self.page_capacity > MAX_PAGE_CAPACITY {
            return Err(ConfigError::PageCapacityTooLarge {
                requested: self.page_capacity,
                max: MAX_PAGE_CAPACITY,
            });
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        let config = StorageConfig::default();
        assert_eq!(config.page_capacity, 16_384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = StorageConfig::new().with_page_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPageCapacity));
    }

    #[test]
    fn test_sentinel_capacity_rejected() {
        let config = StorageConfig::new().with_page_capacity(u32::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PageCapacityTooLarge { .. })
        ));
    }

    #[test]
    fn test_env_override() {
        let config = StorageConfig::new()
            .with_env_override(Some(" 64 ".to_string()))
            .unwrap();
        assert_eq!(config.page_capacity, 64);

        let unchanged = StorageConfig::new().with_env_override(None).unwrap();
        assert_eq!(unchanged, StorageConfig::new());
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = StorageConfig::new()
            .with_env_override(Some("lots".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: PAGE_CAPACITY_ENV,
                value: "lots".to_string(),
            }
        );
        assert_eq!(
            StorageConfig::new()
                .with_env_override(Some("0".to_string()))
                .unwrap_err(),
            ConfigError::ZeroPageCapacity
        );
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: StorageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StorageConfig::default());

        let config: StorageConfig = serde_json::from_str(r#"{"page_capacity": 256}"#).unwrap();
        assert_eq!(config.page_capacity, 256);
    }
}
