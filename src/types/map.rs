use crate::error::{Error, Result};
use crate::types::{Object, Position, Town, TypeId};
use crate::utils::ByteString;
use std::collections::BTreeMap;

/// Tile state flags as stored by both formats
///
/// Flags are carried as an opaque `u32`; these constants only name the bits
/// the game server is known to use.
pub mod tile_flags {
    pub const PROTECTION_ZONE: u32 = 0x0001;
    pub const NO_PVP: u32 = 0x0004;
    pub const NO_LOGOUT: u32 = 0x0008;
    pub const PVP_ZONE: u32 = 0x0010;
    pub const REFRESH: u32 = 0x0020;
}

/// Default map canvas: the full 16-bit coordinate range
pub const DEFAULT_MAP_SIZE: u16 = u16::MAX;

/// Global map metadata carried by the tree map's root nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapHeader {
    pub width: u16,
    pub height: u16,
    pub description: ByteString,
    /// External spawn file name the editor loads next to the map
    pub spawn_file: Option<ByteString>,
    /// External house file name the editor loads next to the map
    pub house_file: Option<ByteString>,
}

impl Default for MapHeader {
    fn default() -> Self {
        Self {
            width: DEFAULT_MAP_SIZE,
            height: DEFAULT_MAP_SIZE,
            description: ByteString::default(),
            spawn_file: None,
            house_file: None,
        }
    }
}

/// A single map square
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub position: Position,
    pub flags: u32,
    pub house_id: Option<u32>,
    pub ground: Option<Object>,
    /// Objects stacked on the tile, bottom first
    pub items: Vec<Object>,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            flags: 0,
            house_id: None,
            ground: None,
            items: Vec::new(),
        }
    }

    /// Ground (if any) followed by the stacked objects
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.ground.iter().chain(self.items.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.ground.is_none() && self.items.is_empty()
    }
}

/// In-memory map shared by both conversion directions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Map {
    pub header: MapHeader,
    /// Towns in file order
    pub towns: Vec<Town>,
    tiles: BTreeMap<Position, Tile>,
}

impl Map {
    pub fn new(header: MapHeader) -> Self {
        Self {
            header,
            towns: Vec::new(),
            tiles: BTreeMap::new(),
        }
    }

    /// Insert a tile, returning the tile previously stored at that position
    pub fn insert_tile(&mut self, tile: Tile) -> Option<Tile> {
        self.tiles.insert(tile.position, tile)
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        self.tiles.get(&position)
    }

    /// Tiles in ascending position order
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn into_tiles(self) -> impl Iterator<Item = Tile> {
        self.tiles.into_values()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Number of objects including container contents
    pub fn object_count(&self) -> usize {
        let mut count = 0;
        for tile in self.tiles.values() {
            for object in tile.objects() {
                object.walk(&mut |_| count += 1);
            }
        }
        count
    }

    /// Check every object (nested contents included) against `is_known`
    ///
    /// Fails with `UnknownTypeId` for the first unknown identifier, in
    /// position order.
    pub fn validate_type_ids(&self, is_known: impl Fn(TypeId) -> bool) -> Result<()> {
        for tile in self.tiles.values() {
            let mut unknown = None;
            for object in tile.objects() {
                object.walk(&mut |o| {
                    if unknown.is_none() && !is_known(o.type_id) {
                        unknown = Some(o.type_id);
                    }
                });
            }

            if let Some(type_id) = unknown {
                return Err(Error::UnknownTypeId {
                    type_id,
                    position: tile.position,
                });
            }
        }
        Ok(())
    }

    /// Move a leading ground object from the stack into the ground slot
    ///
    /// Maps saved by the editor may store a ground as an ordinary first item.
    /// Whether the bottom object of a tile without ground is one is decided by
    /// `is_ground`.
    pub fn classify_ground(&mut self, is_ground: impl Fn(TypeId) -> bool) {
        for tile in self.tiles.values_mut() {
            if tile.ground.is_some() {
                continue;
            }
            if tile.items.first().is_some_and(|o| is_ground(o.type_id)) {
                tile.ground = Some(tile.items.remove(0));
            }
        }
    }
}
