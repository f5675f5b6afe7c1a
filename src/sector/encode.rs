use super::*;
use crate::utils::io::{write_u8, write_u16_le, write_u32_le};
use std::io::Write;

pub(super) fn encode(sector: &Sector) -> Result<Vec<u8>> {
    sector.id.validate()?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + sector.tile_count() * 16);
    buf.write_all(&SECTOR_MAGIC)?;
    write_u16_le(&mut buf, FORMAT_VERSION)?;
    write_u16_le(&mut buf, sector.id.x)?;
    write_u16_le(&mut buf, sector.id.y)?;
    write_u8(&mut buf, sector.id.z)?;
    write_u8(&mut buf, crate::coords::SECTOR_SIZE as u8)?;
    // `insert_tile` keys by offset, so the count never exceeds the grid
    write_u16_le(&mut buf, sector.tile_count() as u16)?;

    for tile in sector.tiles() {
        write_tile(&mut buf, tile)?;
        if buf.len() > MAX_SECTOR_FILE_SIZE {
            return Err(Error::LimitExceeded {
                what: "sector file size",
                limit: MAX_SECTOR_FILE_SIZE,
                actual: buf.len(),
            });
        }
    }

    Ok(buf)
}

fn write_tile<W: Write>(writer: &mut W, tile: &SectorTile) -> Result<()> {
    if tile.items.len() > MAX_TILE_OBJECTS {
        return Err(Error::LimitExceeded {
            what: "tile stack depth",
            limit: MAX_TILE_OBJECTS,
            actual: tile.items.len(),
        });
    }

    write_u8(writer, tile.offset_x)?;
    write_u8(writer, tile.offset_y)?;
    write_u32_le(writer, tile.flags)?;
    write_u32_le(writer, tile.house_id.unwrap_or(0))?;

    match &tile.ground {
        Some(ground) => {
            write_u8(writer, 1)?;
            write_object(writer, ground, 0)?;
        }
        None => write_u8(writer, 0)?,
    }

    write_objects(writer, &tile.items, 0)
}

fn write_objects<W: Write>(writer: &mut W, objects: &[Object], depth: usize) -> Result<()> {
    if objects.len() > MAX_TILE_OBJECTS {
        return Err(Error::LimitExceeded {
            what: "object sequence length",
            limit: MAX_TILE_OBJECTS,
            actual: objects.len(),
        });
    }
    for object in objects {
        write_object(writer, object, depth)?;
    }
    write_u32_le(writer, OBJECT_SENTINEL)?;
    Ok(())
}

fn write_object<W: Write>(writer: &mut W, object: &Object, depth: usize) -> Result<()> {
    if object.type_id.0 == OBJECT_SENTINEL {
        return Err(Error::OutOfRange {
            what: "type id",
            value: object.type_id.0 as i64,
        });
    }
    if depth == MAX_CONTAINER_DEPTH && !object.contents.is_empty() {
        return Err(Error::LimitExceeded {
            what: "container nesting",
            limit: MAX_CONTAINER_DEPTH,
            actual: depth + 1,
        });
    }

    write_u32_le(writer, object.type_id.0)?;
    for attribute in &object.attributes {
        let len = u16::try_from(attribute.data.len()).map_err(|_| Error::LimitExceeded {
            what: "attribute length",
            limit: u16::MAX as usize,
            actual: attribute.data.len(),
        })?;
        write_u8(writer, ATTRIBUTE_MARKER)?;
        write_u8(writer, attribute.tag)?;
        write_u16_le(writer, len)?;
        writer.write_all(&attribute.data)?;
    }
    write_u8(writer, ATTRIBUTE_TERMINATOR)?;

    write_objects(writer, &object.contents, depth + 1)
}
