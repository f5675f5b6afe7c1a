//! Mapping between sector-local addressing and flat global coordinates

use crate::error::{Error, Result};
use crate::types::Position;
use serde::{Deserialize, Serialize};

/// Edge length of a sector in tiles
pub const SECTOR_SIZE: u16 = 32;

/// Highest layer (floor) number
pub const MAX_LAYER: u8 = 15;

/// Number of addressable sectors per axis (the 16-bit coordinate range)
pub const SECTORS_PER_AXIS: u16 = ((u16::MAX as u32 + 1) / SECTOR_SIZE as u32) as u16;

/// Sector address: coarse x/y plus the layer it stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectorId {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

impl SectorId {
    /// Create a sector id, checking it is addressable
    pub fn new(x: u16, y: u16, z: u8) -> Result<Self> {
        let id = Self { x, y, z };
        id.validate()?;
        Ok(id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.x >= SECTORS_PER_AXIS {
            return Err(Error::OutOfRange {
                what: "sector x",
                value: self.x as i64,
            });
        }
        if self.y >= SECTORS_PER_AXIS {
            return Err(Error::OutOfRange {
                what: "sector y",
                value: self.y as i64,
            });
        }
        if self.z > MAX_LAYER {
            return Err(Error::OutOfRange {
                what: "sector layer",
                value: self.z as i64,
            });
        }
        Ok(())
    }

    /// File name used by the game server, e.g. `1000-0998-07.sec`
    pub fn file_name(&self) -> String {
        format!("{:04}-{:04}-{:02}.sec", self.x, self.y, self.z)
    }

    /// Parse a file name produced by [`SectorId::file_name`]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".sec")?;
        let mut parts = stem.split('-');
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        SectorId::new(x, y, z).ok()
    }
}

/// Tile address inside the sector format
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalPosition {
    pub sector: SectorId,
    pub offset_x: u8,
    pub offset_y: u8,
}

/// Constant added to sector-derived coordinates to re-base the map origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseOffset {
    pub x: i32,
    pub y: i32,
}

impl BaseOffset {
    pub const ZERO: BaseOffset = BaseOffset { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// How sector layers relate to the tree map's `z`
///
/// Both formats number floors from the top (0) down to the deepest cave
/// level (15), so `Same` is the default. `Inverted` exists for maps whose
/// layers were numbered upwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerOrder {
    #[default]
    Same,
    Inverted,
}

impl LayerOrder {
    /// Convert in either direction (the mapping is its own inverse)
    fn apply(self, layer: u8) -> u8 {
        match self {
            LayerOrder::Same => layer,
            LayerOrder::Inverted => MAX_LAYER - layer,
        }
    }
}

/// Bidirectional coordinate transform
///
/// For a fixed configuration, `to_local(to_global(p)) == p` for every valid
/// sector-local address `p`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinateMapper {
    pub base_offset: BaseOffset,
    pub layer_order: LayerOrder,
}

impl CoordinateMapper {
    pub fn new(base_offset: BaseOffset, layer_order: LayerOrder) -> Self {
        Self {
            base_offset,
            layer_order,
        }
    }

    /// Sector-local address → global coordinate
    pub fn to_global(&self, sector: SectorId, offset_x: u8, offset_y: u8) -> Result<Position> {
        sector.validate()?;
        check_offset("in-sector x", offset_x)?;
        check_offset("in-sector y", offset_y)?;

        let x = sector.x as i64 * SECTOR_SIZE as i64 + offset_x as i64 + self.base_offset.x as i64;
        let y = sector.y as i64 * SECTOR_SIZE as i64 + offset_y as i64 + self.base_offset.y as i64;

        Ok(Position {
            x: to_coordinate("global x", x)?,
            y: to_coordinate("global y", y)?,
            z: self.layer_order.apply(sector.z),
        })
    }

    /// Global coordinate → sector-local address
    pub fn to_local(&self, position: Position) -> Result<LocalPosition> {
        if position.z > MAX_LAYER {
            return Err(Error::OutOfRange {
                what: "layer",
                value: position.z as i64,
            });
        }

        let x = position.x as i64 - self.base_offset.x as i64;
        let y = position.y as i64 - self.base_offset.y as i64;
        let (sector_x, offset_x) = split_axis("normalized x", x)?;
        let (sector_y, offset_y) = split_axis("normalized y", y)?;

        let sector = SectorId::new(sector_x, sector_y, self.layer_order.apply(position.z))?;
        Ok(LocalPosition {
            sector,
            offset_x,
            offset_y,
        })
    }
}

fn check_offset(what: &'static str, offset: u8) -> Result<()> {
    if offset as u16 >= SECTOR_SIZE {
        return Err(Error::OutOfRange {
            what,
            value: offset as i64,
        });
    }
    Ok(())
}

fn to_coordinate(what: &'static str, value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::OutOfRange { what, value })
}

fn split_axis(what: &'static str, value: i64) -> Result<(u16, u8)> {
    if value < 0 {
        return Err(Error::OutOfRange { what, value });
    }
    let size = SECTOR_SIZE as i64;
    let sector = u16::try_from(value / size).map_err(|_| Error::OutOfRange { what, value })?;
    Ok((sector, (value % size) as u8))
}
