//! Filesystem Parameter System
//!
//! Structured configuration for filesystem creation. Parameter types implement
//! `FileSystemParams`, which keeps a string-map form around for mount option
//! strings and allows drivers to downcast to their own parameter type.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use core::any::Any;

use crate::environment::DEFAULT_CLUSTER_CACHE_BYTES;

/// Core trait for filesystem parameter types
pub trait FileSystemParams {
    /// Convert parameters to a string map (mount option form)
    fn to_string_map(&self) -> BTreeMap<String, String>;

    /// Create parameters from a string map
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - Successfully parsed parameters
    /// * `Err(String)` - Parse error with description
    fn from_string_map(map: &BTreeMap<String, String>) -> Result<Self, String>
    where
        Self: Sized;

    /// Enable dynamic downcasting for runtime type identification
    fn as_any(&self) -> &dyn Any;
}

/// FAT32 mount parameters
///
/// The only tunable is the byte budget of the cluster cache. The number of
/// cache slots is `cache_bytes / cluster_size`, so the budget must cover at
/// least one cluster of the mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32Params {
    /// Memory budget for cached clusters, in bytes
    pub cache_bytes: usize,
}

impl Default for Fat32Params {
    fn default() -> Self {
        Self {
            cache_bytes: DEFAULT_CLUSTER_CACHE_BYTES,
        }
    }
}

impl Fat32Params {
    pub fn with_cache_bytes(cache_bytes: usize) -> Self {
        Self { cache_bytes }
    }

    /// Parse a comma-separated `key=value` option string, e.g. `"cache_bytes=65536"`.
    ///
    /// Unknown keys are rejected; an empty string yields the defaults.
    pub fn from_option_string(options: &str) -> Result<Self, String> {
        let mut map = BTreeMap::new();
        for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| format!("Malformed option: {}", option))?;
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self::from_string_map(&map)
    }
}

impl FileSystemParams for Fat32Params {
    fn to_string_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("cache_bytes".to_string(), self.cache_bytes.to_string());
        map
    }

    fn from_string_map(map: &BTreeMap<String, String>) -> Result<Self, String> {
        if let Some(key) = map.keys().find(|k| k.as_str() != "cache_bytes") {
            return Err(format!("Unknown FAT32 option: {}", key));
        }
        let cache_bytes = match map.get("cache_bytes") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| format!("Invalid cache_bytes value: {}", value))?,
            None => DEFAULT_CLUSTER_CACHE_BYTES,
        };
        Ok(Self { cache_bytes })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
