use super::*;
use crate::types::{Attribute, TypeId};
use crate::utils::io::{read_bytes, read_u8, read_u16_le, read_u32_le};
use std::io::Cursor;

/// Cursor over a sector file that reports byte offsets in its errors
struct SectorReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> SectorReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.offset())
    }

    fn u8(&mut self, context: &'static str) -> Result<u8> {
        let offset = self.offset();
        read_u8(&mut self.cursor).map_err(|_| Error::TruncatedInput { offset, context })
    }

    fn u16(&mut self, context: &'static str) -> Result<u16> {
        let offset = self.offset();
        read_u16_le(&mut self.cursor).map_err(|_| Error::TruncatedInput { offset, context })
    }

    fn u32(&mut self, context: &'static str) -> Result<u32> {
        let offset = self.offset();
        read_u32_le(&mut self.cursor).map_err(|_| Error::TruncatedInput { offset, context })
    }

    /// Read a length-prefixed payload, rejecting lengths beyond the buffer
    fn payload(&mut self, len: usize, context: &'static str) -> Result<Vec<u8>> {
        let offset = self.offset();
        let remaining = self.remaining();
        if len > remaining {
            return Err(Error::format(
                offset,
                format!("{context} declares {len} bytes but only {remaining} remain"),
            ));
        }
        read_bytes(&mut self.cursor, len).map_err(|_| Error::TruncatedInput { offset, context })
    }

    /// Peek whether the next u32 is the object sentinel, consuming it if so
    fn at_sentinel(&mut self) -> Result<bool> {
        if self.remaining() < 4 {
            return Err(Error::format(
                self.offset(),
                "object sequence is missing its sentinel",
            ));
        }
        let position = self.cursor.position();
        if self.u32("object sentinel")? == OBJECT_SENTINEL {
            return Ok(true);
        }
        self.cursor.set_position(position);
        Ok(false)
    }
}

pub(super) fn decode(bytes: &[u8]) -> Result<Sector> {
    if bytes.len() > MAX_SECTOR_FILE_SIZE {
        return Err(Error::LimitExceeded {
            what: "sector file size",
            limit: MAX_SECTOR_FILE_SIZE,
            actual: bytes.len(),
        });
    }

    let mut reader = SectorReader::new(bytes);
    let (id, tile_count) = read_header(&mut reader)?;

    let mut sector = Sector::new(id);
    for _ in 0..tile_count {
        let offset = reader.offset();
        let tile = read_tile(&mut reader)?;
        let (x, y) = (tile.offset_x, tile.offset_y);
        if sector.insert_tile(tile)?.is_some() {
            return Err(Error::format(offset, format!("duplicate tile {x}-{y}")));
        }
    }

    if reader.remaining() > 0 {
        return Err(Error::format(
            reader.offset(),
            format!("{} trailing bytes after last tile", reader.remaining()),
        ));
    }

    Ok(sector)
}

fn read_header(reader: &mut SectorReader<'_>) -> Result<(SectorId, u16)> {
    let mut magic = [0u8; 4];
    for byte in &mut magic {
        *byte = reader.u8("magic bytes")?;
    }
    if magic != SECTOR_MAGIC {
        return Err(Error::format(0, "invalid magic bytes (expected \"TSEC\")"));
    }

    let offset = reader.offset();
    let version = reader.u16("format version")?;
    if version != FORMAT_VERSION {
        return Err(Error::format(
            offset,
            format!("unsupported format version {version}"),
        ));
    }

    let x = reader.u16("sector x")?;
    let y = reader.u16("sector y")?;
    let z = reader.u8("sector layer")?;
    let id = SectorId::new(x, y, z)?;

    let offset = reader.offset();
    let size = reader.u8("sector size")?;
    if size as u16 != crate::coords::SECTOR_SIZE {
        return Err(Error::format(
            offset,
            format!(
                "declared sector size {size}, expected {}",
                crate::coords::SECTOR_SIZE
            ),
        ));
    }

    let offset = reader.offset();
    let tile_count = reader.u16("tile count")?;
    if tile_count as usize > GRID_CAPACITY {
        return Err(Error::format(
            offset,
            format!("tile count {tile_count} exceeds the {GRID_CAPACITY} tile grid"),
        ));
    }

    Ok((id, tile_count))
}

fn read_tile(reader: &mut SectorReader<'_>) -> Result<SectorTile> {
    let mut tile = SectorTile::new(reader.u8("tile offset x")?, reader.u8("tile offset y")?);
    tile.flags = reader.u32("tile flags")?;
    tile.house_id = Some(reader.u32("house id")?).filter(|&id| id != 0);

    let offset = reader.offset();
    tile.ground = match reader.u8("ground marker")? {
        0 => None,
        1 => Some(read_object(reader, 0)?),
        marker => {
            return Err(Error::format(
                offset,
                format!("invalid ground marker 0x{marker:02X}"),
            ));
        }
    };

    tile.items = read_objects(reader, 0)?;
    Ok(tile)
}

fn read_objects(reader: &mut SectorReader<'_>, depth: usize) -> Result<Vec<Object>> {
    let mut objects = Vec::new();
    while !reader.at_sentinel()? {
        if objects.len() == MAX_TILE_OBJECTS {
            return Err(Error::LimitExceeded {
                what: "object sequence length",
                limit: MAX_TILE_OBJECTS,
                actual: objects.len() + 1,
            });
        }
        objects.push(read_object(reader, depth)?);
    }
    Ok(objects)
}

fn read_object(reader: &mut SectorReader<'_>, depth: usize) -> Result<Object> {
    let mut object = Object::new(TypeId(reader.u32("type id")?));

    loop {
        if reader.remaining() == 0 {
            return Err(Error::format(
                reader.offset(),
                format!("attributes of object {} are not terminated", object.type_id),
            ));
        }

        let offset = reader.offset();
        match reader.u8("attribute marker")? {
            ATTRIBUTE_TERMINATOR => break,
            ATTRIBUTE_MARKER => {
                let tag = reader.u8("attribute tag")?;
                let len = reader.u16("attribute length")? as usize;
                let data = reader.payload(len, "attribute")?;
                object.attributes.push(Attribute { tag, data });
            }
            marker => {
                return Err(Error::format(
                    offset,
                    format!("invalid attribute marker 0x{marker:02X}"),
                ));
            }
        }
    }

    if depth == MAX_CONTAINER_DEPTH {
        if !reader.at_sentinel()? {
            return Err(Error::LimitExceeded {
                what: "container nesting",
                limit: MAX_CONTAINER_DEPTH,
                actual: depth + 1,
            });
        }
    } else {
        object.contents = read_objects(reader, depth + 1)?;
    }

    Ok(object)
}
