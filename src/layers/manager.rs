use std::sync::Arc;

use crate::{
    core::{config::ElevationInterpolation, tile_key::TileKey},
    data::heightfield::{is_no_data, HeightField},
    layers::{base::LayerKind, map_layer::MapLayer},
    prelude::HashMap,
    Error, Result,
};

/// Ordered image and elevation layers of a map.
///
/// Order matters: image layers become color slots in this order, and for
/// elevation the last layer wins wherever it has data.
#[derive(Debug, Default)]
pub struct MapLayers {
    image_layers: Vec<Arc<MapLayer>>,
    heightfield_layers: Vec<Arc<MapLayer>>,
    /// Layer name to kind, for duplicate detection and lookup
    names: HashMap<String, LayerKind>,
}

impl MapLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer on top of the existing layers of its kind.
    pub fn add_layer(&mut self, layer: Arc<MapLayer>) -> Result<()> {
        let name = layer.name().to_string();
        if self.names.contains_key(&name) {
            return Err(Error::Layer(format!("layer '{}' already exists", name)));
        }

        self.names.insert(name, layer.kind());
        self.layers_mut(layer.kind()).push(layer);
        Ok(())
    }

    /// Removes a layer by name
    pub fn remove_layer(&mut self, name: &str) -> Option<Arc<MapLayer>> {
        let kind = self.names.remove(name)?;
        let layers = self.layers_mut(kind);
        let index = layers.iter().position(|l| l.name() == name)?;
        Some(layers.remove(index))
    }

    pub fn get_layer(&self, name: &str) -> Option<&Arc<MapLayer>> {
        let kind = self.names.get(name)?;
        self.layers(*kind).iter().find(|l| l.name() == name)
    }

    /// Moves a layer to `index` within its kind, clamping to the end.
    pub fn move_layer(&mut self, name: &str, index: usize) -> Result<()> {
        let kind = *self
            .names
            .get(name)
            .ok_or_else(|| Error::Layer(format!("no layer named '{}'", name)))?;
        let layers = self.layers_mut(kind);
        let from = layers
            .iter()
            .position(|l| l.name() == name)
            .ok_or_else(|| Error::Layer(format!("no layer named '{}'", name)))?;
        let layer = layers.remove(from);
        let index = index.min(layers.len());
        layers.insert(index, layer);
        Ok(())
    }

    pub fn image_layers(&self) -> &[Arc<MapLayer>] {
        &self.image_layers
    }

    pub fn heightfield_layers(&self) -> &[Arc<MapLayer>] {
        &self.heightfield_layers
    }

    pub fn has_heightfield_layers(&self) -> bool {
        !self.heightfield_layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.image_layers.len() + self.heightfield_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Layer names in order, images first
    pub fn list_layers(&self) -> Vec<String> {
        self.image_layers
            .iter()
            .chain(self.heightfield_layers.iter())
            .map(|l| l.name().to_string())
            .collect()
    }

    fn layers(&self, kind: LayerKind) -> &Vec<Arc<MapLayer>> {
        match kind {
            LayerKind::Image => &self.image_layers,
            LayerKind::HeightField => &self.heightfield_layers,
        }
    }

    fn layers_mut(&mut self, kind: LayerKind) -> &mut Vec<Arc<MapLayer>> {
        match kind {
            LayerKind::Image => &mut self.image_layers,
            LayerKind::HeightField => &mut self.heightfield_layers,
        }
    }

    /// Composites elevation from every heightfield layer onto `key`'s grid.
    ///
    /// With `fallback`, a layer lacking data for `key` is subsampled from the
    /// nearest ancestor it does have. Samples no layer covers are set to 0.
    /// Returns `None` when no layer contributed anything.
    pub fn create_heightfield(
        &self,
        key: &TileKey,
        fallback: bool,
        interpolation: ElevationInterpolation,
    ) -> Option<HeightField> {
        let pieces: Vec<HeightField> = self
            .heightfield_layers
            .iter()
            .filter_map(|layer| layer_heightfield(layer, key, fallback))
            .collect();

        let mut out = match pieces.as_slice() {
            [] => return None,
            [single] => single.clone(),
            _ => {
                let cols = pieces.iter().map(|hf| hf.num_columns()).max().unwrap_or(2);
                let rows = pieces.iter().map(|hf| hf.num_rows()).max().unwrap_or(2);
                let mut out = HeightField::create_reference(&key.extent(), cols, rows);
                out.fill(crate::constants::NO_DATA_VALUE);
                let [ox, oy, _] = out.origin();
                for piece in &pieces {
                    for row in 0..rows {
                        let y = oy + out.y_interval() * row as f64;
                        for col in 0..cols {
                            let x = ox + out.x_interval() * col as f64;
                            let h = piece.height_at_location(x, y, interpolation);
                            if !is_no_data(h) {
                                out.set_height(col, row, h);
                            }
                        }
                    }
                }
                out
            }
        };

        out.fill_no_data(0.0);
        Some(out)
    }
}

fn layer_heightfield(layer: &MapLayer, key: &TileKey, fallback: bool) -> Option<HeightField> {
    if layer.is_key_valid(key) {
        if let Some(hf) = layer.create_heightfield(key, None) {
            return Some(hf);
        }
    }
    if !fallback {
        return None;
    }

    let extent = key.extent();
    key.ancestors()
        .filter(|ancestor| layer.is_key_valid(ancestor))
        .find_map(|ancestor| {
            layer
                .create_heightfield(&ancestor, None)
                .map(|hf| hf.create_sub_sample(&ancestor.extent(), &extent))
        })
}
