pub mod config;
pub mod constants;
pub mod extent;
pub mod geo;
pub mod locator;
pub mod map;
pub mod profile;
pub mod srs;
pub mod tile_key;
