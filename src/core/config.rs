//! Volume configuration.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Default side length of the smallest octree nodes, in voxels.
pub const DEFAULT_BASE_NODE_SIZE: u32 = 32;

/// Default memory budget for the paged chunk cache (256 MiB).
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 256 * 1024 * 1024;

/// Tunables for a [`crate::volume::Volume`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Side length of leaf octree nodes. Must be a power of two.
    pub base_node_size: u32,
    /// Coarsest height that is meshed (largest height value).
    pub minimum_lod: u8,
    /// Finest height that is meshed (smallest height value).
    pub maximum_lod: u8,
    /// Bytes of decompressed chunk data kept in memory before eviction.
    pub cache_budget_bytes: usize,
    /// Background tasks drained per update when no main-thread work is pending.
    /// Values above 1 extract meshes in parallel on the rayon pool.
    pub background_tasks_per_update: usize,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            base_node_size: DEFAULT_BASE_NODE_SIZE,
            minimum_lod: 2,
            maximum_lod: 0,
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            background_tasks_per_update: 1,
        }
    }
}

impl VolumeConfig {
    /// Check the values for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.base_node_size < 2 || !self.base_node_size.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "base node size must be a power of two >= 2, got {}",
                self.base_node_size
            )));
        }
        if self.minimum_lod < self.maximum_lod {
            return Err(Error::invalid_argument(format!(
                "minimum LOD ({}) must not be less than maximum LOD ({})",
                self.minimum_lod, self.maximum_lod
            )));
        }
        if self.background_tasks_per_update == 0 {
            return Err(Error::invalid_argument("background_tasks_per_update must be at least 1"));
        }
        Ok(())
    }

    /// Save as pretty-printed JSON
    pub fn save_sync(&self, path: &Path) -> std::result::Result<(), io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)
    }

    /// Load from a JSON file. Missing fields take their default values.
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        assert!(VolumeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_base_node_size() {
        let config = VolumeConfig { base_node_size: 24, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_inverted_lod_range() {
        let config = VolumeConfig { minimum_lod: 0, maximum_lod: 1, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config/volume.json");

        let config = VolumeConfig { base_node_size: 16, minimum_lod: 3, ..Default::default() };
        config.save_sync(&path).unwrap();

        let loaded = VolumeConfig::load_sync(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("volume.json");
        std::fs::write(&path, r#"{ "minimum_lod": 4 }"#).unwrap();

        let loaded = VolumeConfig::load_sync(&path).unwrap();
        assert_eq!(loaded.minimum_lod, 4);
        assert_eq!(loaded.base_node_size, DEFAULT_BASE_NODE_SIZE);
    }
}
