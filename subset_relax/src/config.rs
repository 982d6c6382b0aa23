//! Pipeline configuration, loadable from TOML.
//!
//! ```toml
//! mode = "reuse_checked"
//! halt_on_error = true
//! run_memory_passes = true
//!
//! [memory]
//! alignment = 64
//! device_type = 1
//! default_dtype = "float32"
//! ```
//!
//! Every key is optional.

use crate::error::ConfigError;
use crate::infer::InferenceMode;
use crate::ir::DataType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Policy constants of storage lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Byte alignment of every storage allocation
    pub alignment: i64,
    /// Device placement of every storage allocation
    pub device_type: i64,
    /// Element type of allocations that carry no `dtype` attribute
    #[serde(with = "dtype_string")]
    pub default_dtype: DataType,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            alignment: 64,
            device_type: 1,
            default_dtype: DataType::float(32),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub mode: InferenceMode,
    /// Stop after a pass that reported errors
    pub halt_on_error: bool,
    /// Run explicit allocation and storage lowering after inference
    pub run_memory_passes: bool,
    pub memory: MemoryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: InferenceMode::Normal,
            halt_on_error: false,
            run_memory_passes: true,
            memory: MemoryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// Serialize a [`DataType`] as its string form (`"float32"`).
mod dtype_string {
    use crate::ir::DataType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dtype: &DataType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(dtype)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DataType, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
