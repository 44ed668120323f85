//! Child URIs advertised by paged LOD nodes.
//!
//! The form is `<level>_<x>_<y>.<engine id>.osgearth_osgterrain_tile`.

use std::sync::Arc;

use crate::{
    constants::CHILD_URI_EXTENSION,
    core::{profile::Profile, tile_key::TileKey},
    Error, Result,
};

pub fn create_uri(engine_id: u32, key: &TileKey) -> String {
    format!("{}.{}.{}", key, engine_id, CHILD_URI_EXTENSION)
}

/// Recovers the engine id and key from a URI made by [`create_uri`].
pub fn parse_child_uri(uri: &str, profile: Arc<Profile>) -> Result<(u32, TileKey)> {
    let stem = uri
        .strip_suffix(CHILD_URI_EXTENSION)
        .and_then(|rest| rest.strip_suffix('.'))
        .ok_or_else(|| Error::InvalidUri(format!("unexpected extension in '{}'", uri)))?;

    let (key_text, engine_text) = stem
        .rsplit_once('.')
        .ok_or_else(|| Error::InvalidUri(format!("missing engine id in '{}'", uri)))?;

    let engine_id = engine_text
        .parse::<u32>()
        .map_err(|e| Error::InvalidUri(format!("bad engine id in '{}': {}", uri, e)))?;
    let key = TileKey::parse(key_text, profile)?;
    if !key.is_valid() {
        return Err(Error::InvalidKey(format!("key {} is outside its profile", key)));
    }

    Ok((engine_id, key))
}
