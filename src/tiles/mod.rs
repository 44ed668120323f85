pub mod cache;
pub mod disk_cache;
pub mod l2_cache;
pub mod source;

pub use cache::{Cache, MemoryCache};
pub use disk_cache::DiskCache;
pub use l2_cache::L2Cache;
pub use source::{ProceduralElevationSource, SolidColorSource, TileSource};
