//! Platform configuration
//!
//! Table sizes and pool layouts are fixed per platform. The defaults are the
//! reference platform values; a mission overrides them with a JSON document
//! through [`PlatformConfig::from_json`]. Missing fields keep their defaults.

use fsx_cds::CdsConfig;
use fsx_pool::POOL_MAX_BUCKETS;
use fsx_resource::RESOURCEID_MAX;
use serde::{Deserialize, Serialize};

use crate::syslog::SysLogMode;

/// Reference bucket sizes for memory pools created without their own list
pub const DEFAULT_MEM_BLOCK_SIZES: [usize; 17] = [
    8, 16, 32, 48, 64, 96, 128, 160, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 80000,
];

/// Configuration errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// JSON could not be decoded
    #[error("invalid configuration document: {0}")]
    Parse(String),

    /// A table or buffer size is zero
    #[error("{0} must not be zero")]
    Zero(&'static str),

    /// A table is larger than the handle serial range
    #[error("{field} of {value} exceeds the handle range")]
    TooLarge { field: &'static str, value: usize },

    /// Bucket list is empty, too long, or has a zero size
    #[error("invalid block size list for {0}")]
    BlockSizes(&'static str),

    /// Alignment is not a power of two
    #[error("alignment {0} is not a power of two")]
    Alignment(usize),
}

/// Platform configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub max_apps: usize,
    pub max_libs: usize,
    pub max_tasks: usize,
    pub max_gen_counters: usize,
    pub max_mem_pools: usize,
    /// Default bucket sizes for memory pools
    pub mem_block_sizes: Vec<usize>,
    /// Minimum alignment of memory pool buffers
    pub mempool_align_min: usize,
    /// System log size in bytes
    pub syslog_size: usize,
    pub syslog_mode: SysLogMode,
    pub cds: CdsConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            max_apps: 32,
            max_libs: 10,
            max_tasks: 64,
            max_gen_counters: 8,
            max_mem_pools: 10,
            mem_block_sizes: DEFAULT_MEM_BLOCK_SIZES.to_vec(),
            mempool_align_min: 4,
            syslog_size: 3072,
            syslog_mode: SysLogMode::Overwrite,
            cds: CdsConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Decode and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tables = [
            ("max_apps", self.max_apps),
            ("max_libs", self.max_libs),
            ("max_tasks", self.max_tasks),
            ("max_gen_counters", self.max_gen_counters),
            ("max_mem_pools", self.max_mem_pools),
            ("cds.max_entries", self.cds.max_entries),
        ];
        for (field, value) in tables {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
            if value > RESOURCEID_MAX as usize {
                return Err(ConfigError::TooLarge { field, value });
            }
        }

        if self.syslog_size == 0 {
            return Err(ConfigError::Zero("syslog_size"));
        }
        if !self.mempool_align_min.is_power_of_two() {
            return Err(ConfigError::Alignment(self.mempool_align_min));
        }

        check_block_sizes("mem_block_sizes", &self.mem_block_sizes)?;
        check_block_sizes("cds.block_sizes", &self.cds.block_sizes)
    }
}

/// Check a bucket list the way a pool would at creation.
pub fn check_block_sizes(field: &'static str, sizes: &[usize]) -> Result<(), ConfigError> {
    if sizes.is_empty() || sizes.len() > POOL_MAX_BUCKETS || sizes.contains(&0) {
        return Err(ConfigError::BlockSizes(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsx_cds::CrcAlgorithm;

    #[test]
    fn test_default_is_valid() {
        let config = PlatformConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.mem_block_sizes.len(), POOL_MAX_BUCKETS);
        assert_eq!(config.cds.max_entries, 512);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlatformConfig::from_json(
            r#"{ "max_apps": 4, "syslog_mode": "discard", "cds": { "crc": "crc32" } }"#,
        )
        .unwrap();
        assert_eq!(config.max_apps, 4);
        assert_eq!(config.max_libs, 10);
        assert_eq!(config.syslog_mode, SysLogMode::Discard);
        assert_eq!(config.cds.crc, CrcAlgorithm::Crc32);
        assert_eq!(config.cds.max_entries, 512);
    }

    #[test]
    fn test_json_round_trip() {
        let config = PlatformConfig::default();
        let text = config.to_json().unwrap();
        assert_eq!(PlatformConfig::from_json(&text), Ok(config));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(
            PlatformConfig::from_json(r#"{ "max_tasks": 0 }"#),
            Err(ConfigError::Zero("max_tasks"))
        );
        assert_eq!(
            PlatformConfig::from_json(r#"{ "max_apps": 70000 }"#),
            Err(ConfigError::TooLarge {
                field: "max_apps",
                value: 70000
            })
        );
        assert_eq!(
            PlatformConfig::from_json(r#"{ "mem_block_sizes": [16, 0] }"#),
            Err(ConfigError::BlockSizes("mem_block_sizes"))
        );
        assert_eq!(
            PlatformConfig::from_json(r#"{ "mempool_align_min": 6 }"#),
            Err(ConfigError::Alignment(6))
        );
        assert!(matches!(
            PlatformConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
