//! Configuration for the terrain engine and its tile factory
//!
//! Options can be built from presets, loaded from JSON, or assembled by hand.
//! Every field has a default so partial JSON documents are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable that turns on the shared second-level image cache.
pub const L2_CACHE_ENV_VAR: &str = "TERRAKIT_L2_CACHE";

#[derive(Debug, Clone, PartialEq)]
pub enum TerrainPreset {
    Balanced,
    LowResource,
    HighQuality,
    Custom(TerrainOptions),
}

impl TerrainPreset {
    pub fn resolve(&self) -> TerrainOptions {
        match self {
            Self::Balanced => TerrainOptions::default(),
            Self::LowResource => TerrainOptions {
                min_tile_range_factor: 4.0,
                max_lod: 16,
                loading_policy: LoadingPolicy {
                    mode: LoadingMode::Standard,
                    num_threads_per_core: 1,
                    num_threads: None,
                },
                elevation_interpolation: ElevationInterpolation::Nearest,
                l2_cache: L2CacheConfig {
                    enabled: false,
                    capacity: 64,
                },
                ..TerrainOptions::default()
            },
            Self::HighQuality => TerrainOptions {
                min_tile_range_factor: 8.0,
                max_lod: 23,
                loading_policy: LoadingPolicy {
                    mode: LoadingMode::Preemptive,
                    num_threads_per_core: 4,
                    num_threads: None,
                },
                elevation_interpolation: ElevationInterpolation::Bilinear,
                normalize_edges: true,
                l2_cache: L2CacheConfig {
                    enabled: true,
                    capacity: 2048,
                },
                ..TerrainOptions::default()
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

impl Default for TerrainPreset {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Options consumed by the tile factory and the pager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainOptions {
    /// Multiplier applied to elevation values when tessellating.
    pub vertical_scale: f32,
    /// A tile's children become visible once the eye is closer than
    /// `bounding radius * min_tile_range_factor`.
    pub min_tile_range_factor: f64,
    /// Skirt height as a fraction of the tile's bounding radius.
    pub height_field_skirt_ratio: f64,
    /// Deepest level the factory will advertise children for.
    pub max_lod: u32,
    pub loading_policy: LoadingPolicy,
    pub elevation_interpolation: ElevationInterpolation,
    /// Match shared tile edges after elevation arrives.
    pub normalize_edges: bool,
    pub range_mode: RangeMode,
    pub l2_cache: L2CacheConfig,
    /// Failed builds of a child URI before it stops being advertised.
    pub blacklist_threshold: u32,
}

impl Default for TerrainOptions {
    fn default() -> Self {
        Self {
            vertical_scale: 1.0,
            min_tile_range_factor: 6.0,
            height_field_skirt_ratio: 0.05,
            max_lod: 23,
            loading_policy: LoadingPolicy::default(),
            elevation_interpolation: ElevationInterpolation::default(),
            normalize_edges: false,
            range_mode: RangeMode::default(),
            l2_cache: L2CacheConfig::default(),
            blacklist_threshold: 3,
        }
    }
}

impl TerrainOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads options from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Applies overrides from the process environment.
    ///
    /// A non-empty `TERRAKIT_L2_CACHE` enables the second-level image cache.
    pub fn from_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(L2_CACHE_ENV_VAR) {
            if !value.is_empty() {
                log::debug!("{} set, enabling L2 image cache", L2_CACHE_ENV_VAR);
                self.l2_cache.enabled = true;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.vertical_scale.is_finite() && self.vertical_scale > 0.0) {
            return Err(Error::Config(format!(
                "vertical_scale must be positive, got {}",
                self.vertical_scale
            )));
        }
        if !(self.min_tile_range_factor > 0.0) {
            return Err(Error::Config(format!(
                "min_tile_range_factor must be positive, got {}",
                self.min_tile_range_factor
            )));
        }
        if !(self.height_field_skirt_ratio >= 0.0) {
            return Err(Error::Config(format!(
                "height_field_skirt_ratio must not be negative, got {}",
                self.height_field_skirt_ratio
            )));
        }
        if self.l2_cache.enabled && self.l2_cache.capacity == 0 {
            return Err(Error::Config("l2_cache.capacity must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingMode {
    /// Tiles are built whole, synchronously, by the pager.
    Standard,
    /// Layers are requested one at a time, coarse to fine.
    Sequential,
    /// Layers are requested in parallel and may skip levels.
    Preemptive,
}

impl Default for LoadingMode {
    fn default() -> Self {
        Self::Standard
    }
}

impl std::fmt::Display for LoadingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::Sequential => "sequential",
            Self::Preemptive => "preemptive",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingPolicy {
    pub mode: LoadingMode,
    pub num_threads_per_core: u32,
    /// Overrides the per-core computation when set.
    pub num_threads: Option<u32>,
}

impl LoadingPolicy {
    pub fn is_async(&self) -> bool {
        self.mode != LoadingMode::Standard
    }

    pub fn worker_threads(&self) -> usize {
        if let Some(n) = self.num_threads {
            return (n as usize).max(1);
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cores * self.num_threads_per_core as usize).max(1)
    }
}

impl Default for LoadingPolicy {
    fn default() -> Self {
        Self {
            mode: LoadingMode::Standard,
            num_threads_per_core: 2,
            num_threads: None,
        }
    }
}

/// Sampling used when elevation is resampled onto a tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationInterpolation {
    Nearest,
    Average,
    Bilinear,
}

impl Default for ElevationInterpolation {
    fn default() -> Self {
        Self::Bilinear
    }
}

/// How LOD switch ranges are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMode {
    DistanceFromEyePoint,
    PixelSizeOnScreen,
}

impl Default for RangeMode {
    fn default() -> Self {
        Self::DistanceFromEyePoint
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L2CacheConfig {
    pub enabled: bool,
    /// Maximum number of images held.
    pub capacity: usize,
}

impl Default for L2CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFilterMode {
    Nearest,
    Linear,
    LinearMipmapLinear,
    Anisotropic(u8),
}

impl TextureFilterMode {
    pub fn anisotropy_level(&self) -> u8 {
        match self {
            Self::Anisotropic(level) => *level,
            _ => 1,
        }
    }

    pub fn uses_mipmaps(&self) -> bool {
        matches!(self, Self::LinearMipmapLinear | Self::Anisotropic(_))
    }
}

impl Default for TextureFilterMode {
    fn default() -> Self {
        Self::Linear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TerrainOptions::default();
        assert_eq!(options.vertical_scale, 1.0);
        assert_eq!(options.min_tile_range_factor, 6.0);
        assert_eq!(options.height_field_skirt_ratio, 0.05);
        assert_eq!(options.max_lod, 23);
        assert_eq!(options.loading_policy.mode, LoadingMode::Standard);
        assert_eq!(options.range_mode, RangeMode::DistanceFromEyePoint);
        assert!(!options.l2_cache.enabled);
        assert_eq!(options.blacklist_threshold, 3);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let balanced = TerrainPreset::Balanced.resolve();
        let low = TerrainPreset::LowResource.resolve();
        let high = TerrainPreset::HighQuality.resolve();

        assert_eq!(balanced, TerrainOptions::default());
        assert!(low.max_lod < balanced.max_lod);
        assert!(!low.l2_cache.enabled);
        assert!(high.l2_cache.enabled);
        assert!(high.loading_policy.is_async());

        let custom = TerrainOptions {
            max_lod: 5,
            ..TerrainOptions::default()
        };
        assert_eq!(TerrainPreset::Custom(custom.clone()).resolve(), custom);
    }

    #[test]
    fn test_partial_json() {
        let options = TerrainOptions::from_json_str(
            r#"{ "max_lod": 12, "loading_policy": { "mode": "preemptive" } }"#,
        )
        .unwrap();

        assert_eq!(options.max_lod, 12);
        assert_eq!(options.loading_policy.mode, LoadingMode::Preemptive);
        assert_eq!(options.loading_policy.num_threads_per_core, 2);
        assert_eq!(options.min_tile_range_factor, 6.0);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            TerrainOptions::from_json_str(r#"{ "vertical_scale": -1.0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TerrainOptions::from_json_str("{ not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "terrakit-options-{}.json",
            std::process::id()
        ));
        let options = TerrainPreset::HighQuality.resolve();
        options.save(&path).unwrap();

        let loaded = TerrainOptions::load(&path).unwrap();
        assert_eq!(loaded, options);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_worker_threads() {
        let policy = LoadingPolicy {
            num_threads: Some(3),
            ..LoadingPolicy::default()
        };
        assert_eq!(policy.worker_threads(), 3);
        assert!(LoadingPolicy::default().worker_threads() >= 1);
    }

    #[test]
    fn test_loading_mode_names() {
        assert_eq!(LoadingMode::Standard.to_string(), "standard");
        assert_eq!(LoadingMode::Preemptive.to_string(), "preemptive");
    }
}
