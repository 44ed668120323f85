//! Core constants shared by the tile factory and its collaborators.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Upper bound of a tile's visible range. Large enough to act as "no limit".
pub const MAX_TILE_RANGE: f64 = 1e10;

/// Range used when a paged node occupies the full range with no subdivision.
pub const FULL_RANGE: f64 = f32::MAX as f64;

/// Degrees of longitude per meter at the equator (1 / 111319).
pub const DEGREES_PER_METER_AT_EQUATOR: f64 = 1.0 / 111_319.0;

/// Cluster culling is disabled for tiles whose angular spread reaches this value.
pub const CLUSTER_CULLING_CUTOFF: f64 = std::f64::consts::FRAC_PI_2 - 0.1;

/// Dimensions of synthesized (empty) heightfields.
pub const EMPTY_HEIGHTFIELD_SIZE: u32 = 8;

/// Marker stored in `elevation_lod` for tiles whose elevation is synthetic.
pub const SYNTHETIC_ELEVATION_LOD: i32 = -1;

/// Height value that marks a missing sample in a heightfield.
pub const NO_DATA_VALUE: f32 = -32767.0;

/// Pixels assumed along a tile edge when no imagery reports its resolution.
pub const DEFAULT_TILE_PIXELS: f64 = 256.0;

/// File extension of generated child URIs.
pub const CHILD_URI_EXTENSION: &str = "osgearth_osgterrain_tile";

/// Spherical mercator half-width, in meters.
pub const MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Latitude limit of the spherical mercator projection.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;
