use serde::{Deserialize, Serialize};

use crate::core::config::TextureFilterMode;

/// What a map layer contributes to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Image,
    HeightField,
}

impl LayerKind {
    /// Cache format used when a layer does not configure one.
    pub fn default_cache_format(&self) -> &'static str {
        match self {
            LayerKind::Image => "png",
            LayerKind::HeightField => crate::tiles::cache::HEIGHTFIELD_FORMAT,
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::Image => write!(f, "image"),
            LayerKind::HeightField => write!(f, "heightfield"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapLayerOptions {
    pub name: String,
    /// Shallowest level the layer answers for.
    pub min_level: Option<u32>,
    /// Deepest level the layer answers for (inclusive).
    pub max_level: Option<u32>,
    pub min_filter: TextureFilterMode,
    pub mag_filter: TextureFilterMode,
    pub cache_format: Option<String>,
    /// `Some(false)` forbids placing mercator imagery on a geographic map
    /// without reprojection.
    pub use_mercator_fast_path: Option<bool>,
    pub opacity: f32,
}

impl MapLayerOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_levels(mut self, min_level: Option<u32>, max_level: Option<u32>) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    pub fn with_mercator_fast_path(mut self, enabled: bool) -> Self {
        self.use_mercator_fast_path = Some(enabled);
        self
    }
}

impl Default for MapLayerOptions {
    fn default() -> Self {
        Self {
            name: "layer".to_string(),
            min_level: None,
            max_level: None,
            min_filter: TextureFilterMode::LinearMipmapLinear,
            mag_filter: TextureFilterMode::Linear,
            cache_format: None,
            use_mercator_fast_path: None,
            opacity: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_options() {
        let options = MapLayerOptions::new("imagery").with_levels(Some(1), Some(10));
        assert_eq!(options.name, "imagery");
        assert_eq!(options.min_level, Some(1));
        assert_eq!(options.max_level, Some(10));
        assert_eq!(options.opacity, 1.0);
        assert!(options.use_mercator_fast_path.is_none());
    }

    #[test]
    fn test_options_from_json() {
        let options: MapLayerOptions =
            serde_json::from_str(r#"{ "name": "dem", "max_level": 12, "use_mercator_fast_path": false }"#)
                .unwrap();
        assert_eq!(options.max_level, Some(12));
        assert_eq!(options.use_mercator_fast_path, Some(false));
        assert_eq!(options.mag_filter, TextureFilterMode::Linear);
    }

    #[test]
    fn test_layer_kind_display() {
        assert_eq!(LayerKind::Image.to_string(), "image");
        assert_eq!(LayerKind::HeightField.to_string(), "heightfield");
        assert_eq!(LayerKind::Image.default_cache_format(), "png");
    }
}
