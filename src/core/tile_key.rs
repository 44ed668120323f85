//! Quadtree addressing.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    core::{extent::GeoExtent, profile::Profile},
    Error, Result,
};

/// Lookup identity of a tile inside a single profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.level, self.x, self.y)
    }
}

/// Child position inside a parent tile. The discriminant is the quadrant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    /// Quadrants in the order sub-tiles are assembled.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    fn offsets(self) -> (u32, u32) {
        match self {
            Quadrant::NorthWest => (0, 0),
            Quadrant::NorthEast => (1, 0),
            Quadrant::SouthWest => (0, 1),
            Quadrant::SouthEast => (1, 1),
        }
    }
}

/// A quadtree cell: level of detail, column and row inside a profile.
#[derive(Debug, Clone)]
pub struct TileKey {
    level: u32,
    x: u32,
    y: u32,
    profile: Arc<Profile>,
}

impl TileKey {
    pub fn new(level: u32, x: u32, y: u32, profile: Arc<Profile>) -> Self {
        Self {
            level,
            x,
            y,
            profile,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    pub fn tile_id(&self) -> TileId {
        TileId::new(self.level, self.x, self.y)
    }

    pub fn extent(&self) -> GeoExtent {
        self.profile.tile_extent(self.level, self.x, self.y)
    }

    /// Whether the key addresses a cell inside its profile's domain.
    pub fn is_valid(&self) -> bool {
        let (cols, rows) = self.profile.num_tiles(self.level);
        self.x < cols && self.y < rows && self.extent().intersects(self.profile.extent())
    }

    /// The key one level deeper in the given quadrant.
    pub fn create_child_key(&self, quadrant: Quadrant) -> TileKey {
        let (dx, dy) = quadrant.offsets();
        TileKey::new(
            self.level + 1,
            self.x * 2 + dx,
            self.y * 2 + dy,
            self.profile.clone(),
        )
    }

    /// All four children, in quadrant order.
    pub fn children(&self) -> [TileKey; 4] {
        Quadrant::ALL.map(|q| self.create_child_key(q))
    }

    /// The containing key one level up; `None` at level 0.
    pub fn create_parent_key(&self) -> Option<TileKey> {
        if self.level == 0 {
            None
        } else {
            Some(TileKey::new(
                self.level - 1,
                self.x / 2,
                self.y / 2,
                self.profile.clone(),
            ))
        }
    }

    /// Iterates over this key's ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = TileKey> {
        std::iter::successors(self.create_parent_key(), |key| key.create_parent_key())
    }

    /// Parses the `level_x_y` form produced by `Display`.
    pub fn parse(text: &str, profile: Arc<Profile>) -> Result<TileKey> {
        let mut parts = text.split('_');
        let mut next = |what: &str| -> Result<u32> {
            parts
                .next()
                .ok_or_else(|| Error::InvalidKey(format!("missing {} in '{}'", what, text)))?
                .parse::<u32>()
                .map_err(|e| Error::InvalidKey(format!("bad {} in '{}': {}", what, text, e)))
        };

        let level = next("level")?;
        let x = next("column")?;
        let y = next("row")?;
        if parts.next().is_some() {
            return Err(Error::InvalidKey(format!("trailing data in '{}'", text)));
        }

        Ok(TileKey::new(level, x, y, profile))
    }
}

impl PartialEq for TileKey {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level
            && self.x == other.x
            && self.y == other.y
            && (Arc::ptr_eq(&self.profile, &other.profile)
                || self.profile.is_equivalent_to(&other.profile))
    }
}

impl Eq for TileKey {}

impl Hash for TileKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tile_id().hash(state);
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.tile_id().fmt(f)
    }
}
