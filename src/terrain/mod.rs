//! Terrain tiles, the factory that builds them and the pager that drives it.

pub mod blacklist;
pub mod factory;
pub mod node;
pub mod paging;
pub mod registry;
pub mod tile;
pub mod uri;

pub use blacklist::Blacklist;
pub use factory::{CreatedTile, TileFactory};
pub use node::{LodView, PagedLod, TileNode};
pub use paging::{FrameStats, TileBackfill, TilePager};
pub use registry::CustomTerrain;
pub use tile::{CustomTile, HeightFieldLayer, ImageLayer, TerrainTechnique, TileLayers};
pub use uri::{create_uri, parse_child_uri};
