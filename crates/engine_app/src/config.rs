//! Demo configuration.
//!
//! Loaded from an optional JSON file; command-line flags override individual
//! fields afterwards.
//!
//! ```json
//! {
//!   "storage": { "page_capacity": 1024 },
//!   "tick": { "tick_rate": 60.0, "max_ticks": 120 },
//!   "spawns": [
//!     { "count": 500, "components": ["Transform", "Velocity", "Mesh"], "velocity": [1, 0, 0] }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use engine_storage::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::tick::TickConfig;

/// A group of identical entities spawned at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnBatch {
    /// Number of entities.
    pub count: u32,
    /// Catalog names of the kinds each entity carries.
    pub components: Vec<String>,
    /// Initial velocity for batches carrying `Velocity`.
    #[serde(default)]
    pub velocity: [f32; 3],
    /// Lifetime in seconds for batches carrying `Lifetime`.
    #[serde(default = "default_lifetime")]
    pub lifetime: f32,
    /// Mesh id for batches carrying `Mesh` or `SkinnedMesh`.
    #[serde(default)]
    pub mesh: u32,
}

fn default_lifetime() -> f32 {
    1.0
}

/// Full demo configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pool configuration.
    pub storage: StorageConfig,
    /// Frame loop configuration.
    pub tick: TickConfig,
    /// Entities to spawn before the first frame.
    pub spawns: Vec<SpawnBatch>,
}

impl AppConfig {
    /// Read a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            tick: TickConfig::default(),
            spawns: vec![
                SpawnBatch {
                    count: 1000,
                    components: vec!["Transform".into(), "Mesh".into()],
                    velocity: [0.0; 3],
                    lifetime: default_lifetime(),
                    mesh: 1,
                },
                SpawnBatch {
                    count: 500,
                    components: vec!["Transform".into(), "Velocity".into(), "SkinnedMesh".into()],
                    velocity: [1.0, 0.0, 0.0],
                    lifetime: default_lifetime(),
                    mesh: 2,
                },
                SpawnBatch {
                    count: 200,
                    components: vec![
                        "Transform".into(),
                        "Velocity".into(),
                        "Lifetime".into(),
                        "Collider".into(),
                    ],
                    velocity: [0.0, 2.0, 0.0],
                    lifetime: 0.5,
                    mesh: 0,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_config() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "storage": { "page_capacity": 64 },
                "spawns": [{ "count": 3, "components": ["Transform"] }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.storage.page_capacity, 64);
        assert_eq!(config.tick, TickConfig::default());
        assert_eq!(config.spawns.len(), 1);
        assert_eq!(config.spawns[0].velocity, [0.0; 3]);
        assert_eq!(config.spawns[0].lifetime, 1.0);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = AppConfig::load(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
