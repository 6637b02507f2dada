//! Cache parameters for the quad-tree render cache.
//!
//! Parameters are fixed for the lifetime of a cache (they can be swapped as a
//! whole with `QuadTreeCache::update_settings`). They can be built in code,
//! loaded from environment variables, or read from a TOML file.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default pixel count for one node bitmap (512 x 512)
pub const DEFAULT_ENTRY_SIZE: usize = 512 * 512;

/// Default maximum magnification of a cached bitmap
pub const DEFAULT_MAX_ZOOM: f64 = 2.0;

/// Default pixel budget: sixteen full-size entries
pub const DEFAULT_MAX_SIZE: usize = 16 * DEFAULT_ENTRY_SIZE;

/// Strategy used to pick which cached bitmaps to drop when over budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncachePolicy {
    /// First drop data far sharper than the current zoom needs, then fall
    /// back to least-recently-used
    #[default]
    ViewportThenLru,
    /// Drop least-recently-used data only
    Lru,
}

impl UncachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncachePolicy::ViewportThenLru => "viewport_then_lru",
            UncachePolicy::Lru => "lru",
        }
    }
}

impl fmt::Display for UncachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UncachePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "viewport_then_lru" => Ok(UncachePolicy::ViewportThenLru),
            "lru" => Ok(UncachePolicy::Lru),
            _ => Err(ConfigError::InvalidValue {
                key: "uncache_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for a quad-tree render cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheParams {
    /// Target pixel count of any one node's cached bitmap
    pub entry_size: usize,
    /// Largest bitmap-pixel to destination-pixel magnification tolerated
    /// before a node is considered too blurry and must be refined
    pub max_zoom: f64,
    /// Pixel budget for the whole tree (or all trees sharing one counter)
    pub max_size: usize,
    /// Eviction strategy when `max_size` is exceeded
    pub uncache_policy: UncachePolicy,
    /// Outline painted regions (red: served from a node bitmap, blue:
    /// delegated to children)
    pub debug_overlay: bool,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            entry_size: DEFAULT_ENTRY_SIZE,
            max_zoom: DEFAULT_MAX_ZOOM,
            max_size: DEFAULT_MAX_SIZE,
            uncache_policy: UncachePolicy::default(),
            debug_overlay: false,
        }
    }
}

impl CacheParams {
    /// Creates parameters with explicit values and no debug overlay.
    pub fn new(
        entry_size: usize,
        max_zoom: f64,
        max_size: usize,
        uncache_policy: UncachePolicy,
    ) -> Self {
        Self {
            entry_size,
            max_zoom,
            max_size,
            uncache_policy,
            debug_overlay: false,
        }
    }

    /// Sets the target pixel count of one node bitmap.
    pub fn with_entry_size(mut self, pixels: usize) -> Self {
        self.entry_size = pixels;
        self
    }

    /// Sets the maximum tolerated magnification.
    pub fn with_max_zoom(mut self, max_zoom: f64) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    /// Sets the global pixel budget.
    pub fn with_max_size(mut self, pixels: usize) -> Self {
        self.max_size = pixels;
        self
    }

    /// Sets the eviction strategy.
    pub fn with_uncache_policy(mut self, policy: UncachePolicy) -> Self {
        self.uncache_policy = policy;
        self
    }

    /// Enables or disables the debug overlay.
    pub fn with_debug_overlay(mut self, enabled: bool) -> Self {
        self.debug_overlay = enabled;
        self
    }

    /// Checks that the parameters describe a usable cache.
    ///
    /// # Errors
    /// Returns an error if `entry_size` is zero or `max_zoom` is not a
    /// positive finite number.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_size == 0 {
            return Err(ConfigError::OutOfRange {
                key: "entry_size",
                reason: "must be at least one pixel",
            });
        }

        if !self.max_zoom.is_finite() || self.max_zoom <= 0.0 {
            return Err(ConfigError::OutOfRange {
                key: "max_zoom",
                reason: "must be a positive finite number",
            });
        }

        Ok(())
    }

    /// Loads parameters from environment variables, starting from defaults.
    ///
    /// Environment variables:
    /// - `QUADCACHE_ENTRY_SIZE`: pixels per node bitmap (default: 262144)
    /// - `QUADCACHE_MAX_ZOOM`: maximum magnification (default: 2.0)
    /// - `QUADCACHE_MAX_SIZE`: pixel budget (default: 4194304)
    /// - `QUADCACHE_UNCACHE_POLICY`: `viewport_then_lru` or `lru`
    /// - `QUADCACHE_DEBUG_OVERLAY`: `true` or `false`
    ///
    /// # Errors
    /// Returns an error if any variable holds an unparsable value, or the
    /// resulting parameters fail validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut params = Self::default();

        if let Some(value) = env_value("QUADCACHE_ENTRY_SIZE") {
            params.entry_size = parse_value("QUADCACHE_ENTRY_SIZE", &value)?;
        }

        if let Some(value) = env_value("QUADCACHE_MAX_ZOOM") {
            params.max_zoom = parse_value("QUADCACHE_MAX_ZOOM", &value)?;
        }

        if let Some(value) = env_value("QUADCACHE_MAX_SIZE") {
            params.max_size = parse_value("QUADCACHE_MAX_SIZE", &value)?;
        }

        if let Some(value) = env_value("QUADCACHE_UNCACHE_POLICY") {
            params.uncache_policy = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "QUADCACHE_UNCACHE_POLICY".to_string(),
                value: value.clone(),
            })?;
        }

        if let Some(value) = env_value("QUADCACHE_DEBUG_OVERLAY") {
            params.debug_overlay = parse_value("QUADCACHE_DEBUG_OVERLAY", &value)?;
        }

        params.validate()?;
        Ok(params)
    }

    /// Loads parameters from a TOML file.
    ///
    /// Expected file format (every key optional):
    /// ```toml
    /// entry_size = 262144
    /// max_zoom = 2.0
    /// max_size = 4194304
    /// uncache_policy = "viewport_then_lru"
    /// debug_overlay = false
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;

        Self::from_toml(&contents)
    }

    /// Parses parameters from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let params: Self = toml::from_str(toml_str)?;
        params.validate()?;
        Ok(params)
    }

    /// Saves parameters to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the parameters cannot be serialized or the file
    /// cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml = self.to_toml()?;
        fs::write(path.as_ref(), toml)?;
        Ok(())
    }

    /// Converts parameters to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Errors that can occur while building or loading cache parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("{key} {reason}")]
    OutOfRange {
        key: &'static str,
        reason: &'static str,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
