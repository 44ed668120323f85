pub mod base;
pub mod manager;
pub mod map_layer;
