//! Legacy per-sector binary map files
//!
//! One file stores one 32×32 sector of a single layer. All integers are
//! little-endian.
//!
//! ```text
//! header       magic "TSEC", version u16, sector x u16, sector y u16,
//!              layer u8, sector size u8 (= 32), tile count u16
//! tile         offset x u8, offset y u8, flags u32, house id u32,
//!              ground marker u8, [object], object*, sentinel u32
//! object       type id u32, (0x01 tag u8 len u16 data)*, 0x00,
//!              object* (contents), sentinel u32
//! ```

mod decode;
mod encode;

use crate::coords::SectorId;
use crate::error::{Error, Result};
use crate::types::Object;
use std::collections::BTreeMap;

/// Sector file magic bytes
pub const SECTOR_MAGIC: [u8; 4] = *b"TSEC";

/// Only known sector file version
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 14;

/// Type id value closing an object sequence
pub const OBJECT_SENTINEL: u32 = 0xFFFF_FFFF;

/// Marker preceding each attribute record
const ATTRIBUTE_MARKER: u8 = 0x01;

/// Marker closing the attribute records of an object
const ATTRIBUTE_TERMINATOR: u8 = 0x00;

/// Tiles a sector can hold
pub const GRID_CAPACITY: usize = 32 * 32;

/// Maximum stacked objects per tile (ground excluded)
pub const MAX_TILE_OBJECTS: usize = 255;

/// Maximum container nesting below a tile object
pub const MAX_CONTAINER_DEPTH: usize = 16;

/// Maximum size of an encoded sector file
pub const MAX_SECTOR_FILE_SIZE: usize = 16 * 1024 * 1024;

/// One tile record inside a sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorTile {
    pub offset_x: u8,
    pub offset_y: u8,
    pub flags: u32,
    pub house_id: Option<u32>,
    pub ground: Option<Object>,
    pub items: Vec<Object>,
}

impl SectorTile {
    pub fn new(offset_x: u8, offset_y: u8) -> Self {
        Self {
            offset_x,
            offset_y,
            flags: 0,
            house_id: None,
            ground: None,
            items: Vec::new(),
        }
    }
}

/// Decoded sector file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sector {
    pub id: SectorId,
    tiles: BTreeMap<(u8, u8), SectorTile>,
}

impl Sector {
    pub fn new(id: SectorId) -> Self {
        Self {
            id,
            tiles: BTreeMap::new(),
        }
    }

    /// Insert a tile, returning the tile previously stored at its offset
    ///
    /// Fails with `OutOfRange` when the offset lies outside the grid.
    pub fn insert_tile(&mut self, tile: SectorTile) -> Result<Option<SectorTile>> {
        for (what, value) in [("in-sector x", tile.offset_x), ("in-sector y", tile.offset_y)] {
            if value as u16 >= crate::coords::SECTOR_SIZE {
                return Err(Error::OutOfRange {
                    what,
                    value: value as i64,
                });
            }
        }
        Ok(self.tiles.insert((tile.offset_x, tile.offset_y), tile))
    }

    pub fn tile(&self, offset_x: u8, offset_y: u8) -> Option<&SectorTile> {
        self.tiles.get(&(offset_x, offset_y))
    }

    /// Tiles in ascending `(offset_x, offset_y)` order
    pub fn tiles(&self) -> impl Iterator<Item = &SectorTile> {
        self.tiles.values()
    }

    pub fn into_tiles(self) -> impl Iterator<Item = SectorTile> {
        self.tiles.into_values()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Parse a complete sector file
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode::decode(bytes)
    }

    /// Serialize into the sector file layout
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode::encode(self)
    }
}
