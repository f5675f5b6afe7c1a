//! Mapping between [`Map`] and the editor's map node layout
//!
//! ```text
//! MAP_HEADER          version u32, width u16, height u16, items major u32, items minor u32
//!   MAP_DATA          DESCRIPTION, [EXT_SPAWN_FILE], [EXT_HOUSE_FILE]
//!     TILE_AREA       base x u16, base y u16, z u8
//!       TILE          x u8, y u8, [TILE_FLAGS u32], [GROUND_NODE | ITEM u16]
//!       HOUSETILE     x u8, y u8, house id u32, [TILE_FLAGS u32], [GROUND_NODE | ITEM u16]
//!         ITEM        type id u16, attribute records
//!           ITEM      container contents
//!     TOWNS
//!       TOWN          id u32, name, temple x u16, temple y u16, temple z u8
//! ```
//!
//! A tile with a ground carries `GROUND_NODE` and lists the ground as its
//! first `ITEM`. Maps saved by the editor may instead name a plain ground
//! inline with the `ITEM` tile attribute.
//!
//! An attribute record is written as `tag ‖ data` when the editor's value
//! width for `tag` delimits it exactly. Any other record is wrapped as
//! `FRAMED tag len:u16 data`.
//!
//! Offsets in errors raised here are relative to the props of the node being
//! read.

use super::node::Node;
use super::props::{PropReader, write_string};
use super::NODE_END;
use crate::error::{Error, Result};
use crate::types::{Attribute, Map, MapHeader, Object, Position, Tile, Town, TypeId};
use crate::utils::ByteString;
use crate::utils::io::{write_u8, write_u16_le, write_u32_le};
use std::collections::BTreeMap;

/// Map format version written into the header
pub const MAP_VERSION: u32 = 1;

/// Item catalog major version the map refers to
pub const ITEMS_MAJOR_VERSION: u32 = 1;

/// Item catalog minor version the map refers to
pub const ITEMS_MINOR_VERSION: u32 = 100;

pub mod node_kind {
    pub const MAP_HEADER: u8 = 0x00;
    pub const MAP_DATA: u8 = 0x02;
    pub const TILE_AREA: u8 = 0x04;
    pub const TILE: u8 = 0x05;
    pub const ITEM: u8 = 0x06;
    pub const TOWNS: u8 = 0x0C;
    pub const TOWN: u8 = 0x0D;
    pub const HOUSETILE: u8 = 0x0E;
    pub const WAYPOINTS: u8 = 0x0F;
}

/// Attribute tags
pub mod attr {
    pub const DESCRIPTION: u8 = 1;
    pub const TILE_FLAGS: u8 = 3;
    pub const ACTION_ID: u8 = 4;
    pub const UNIQUE_ID: u8 = 5;
    pub const TEXT: u8 = 6;
    pub const DESC: u8 = 7;
    pub const TELE_DEST: u8 = 8;
    pub const ITEM: u8 = 9;
    pub const DEPOT_ID: u8 = 10;
    pub const EXT_SPAWN_FILE: u8 = 11;
    pub const RUNE_CHARGES: u8 = 12;
    pub const EXT_HOUSE_FILE: u8 = 13;
    pub const HOUSEDOORID: u8 = 14;
    pub const COUNT: u8 = 15;
    pub const DURATION: u8 = 16;
    pub const DECAYING_STATE: u8 = 17;
    pub const WRITTENDATE: u8 = 18;
    pub const WRITTENBY: u8 = 19;
    pub const SLEEPERGUID: u8 = 20;
    pub const SLEEPSTART: u8 = 21;
    pub const CHARGES: u8 = 22;
    pub const TIER: u8 = 41;

    /// Item attribute: a record with explicit tag and `u16` length
    pub const FRAMED: u8 = 0x80;
    /// Tile attribute without value: the first `ITEM` child is the ground
    pub const GROUND_NODE: u8 = 0x81;
}

/// Build the node tree for `map`
///
/// Type ids that do not fit the 16-bit item field fail with `OutOfRange`.
pub fn project(map: &Map) -> Result<Node> {
    let mut root = Node::with_props(node_kind::MAP_HEADER, header_props(&map.header)?);
    let mut data = Node::with_props(node_kind::MAP_DATA, map_data_props(&map.header)?);

    let mut areas: BTreeMap<(u16, u16, u8), Node> = BTreeMap::new();
    for tile in map.tiles() {
        let Position { x, y, z } = tile.position;
        let (base_x, base_y) = (x & 0xFF00, y & 0xFF00);
        let area = areas.entry((base_x, base_y, z)).or_insert_with(|| {
            let mut props = Vec::with_capacity(5);
            props.extend(base_x.to_le_bytes());
            props.extend(base_y.to_le_bytes());
            props.push(z);
            Node::with_props(node_kind::TILE_AREA, props)
        });
        area.children.push(project_tile(tile)?);
    }
    data.children.extend(areas.into_values());

    // after the tile areas, so the editor finds the temple tiles
    if !map.towns.is_empty() {
        let mut towns = Node::new(node_kind::TOWNS);
        for town in &map.towns {
            towns.children.push(project_town(town)?);
        }
        data.children.push(towns);
    }

    root.children.push(data);
    Ok(root)
}

fn header_props(header: &MapHeader) -> Result<Vec<u8>> {
    let mut props = Vec::with_capacity(16);
    write_u32_le(&mut props, MAP_VERSION)?;
    write_u16_le(&mut props, header.width)?;
    write_u16_le(&mut props, header.height)?;
    write_u32_le(&mut props, ITEMS_MAJOR_VERSION)?;
    write_u32_le(&mut props, ITEMS_MINOR_VERSION)?;
    Ok(props)
}

fn map_data_props(header: &MapHeader) -> Result<Vec<u8>> {
    let mut props = Vec::new();
    props.push(attr::DESCRIPTION);
    write_string(&mut props, header.description.as_bytes())?;
    if let Some(spawn_file) = &header.spawn_file {
        props.push(attr::EXT_SPAWN_FILE);
        write_string(&mut props, spawn_file.as_bytes())?;
    }
    if let Some(house_file) = &header.house_file {
        props.push(attr::EXT_HOUSE_FILE);
        write_string(&mut props, house_file.as_bytes())?;
    }
    Ok(props)
}

fn project_tile(tile: &Tile) -> Result<Node> {
    let mut props = Vec::with_capacity(11);
    write_u8(&mut props, (tile.position.x & 0xFF) as u8)?;
    write_u8(&mut props, (tile.position.y & 0xFF) as u8)?;

    let kind = match tile.house_id {
        Some(house_id) => {
            write_u32_le(&mut props, house_id)?;
            node_kind::HOUSETILE
        }
        None => node_kind::TILE,
    };

    if tile.flags != 0 {
        props.push(attr::TILE_FLAGS);
        write_u32_le(&mut props, tile.flags)?;
    }
    if tile.ground.is_some() {
        props.push(attr::GROUND_NODE);
    }

    let mut node = Node::with_props(kind, props);
    for object in tile.objects() {
        node.children.push(project_object(object)?);
    }
    Ok(node)
}

fn project_object(object: &Object) -> Result<Node> {
    let type_id = u16::try_from(object.type_id.0).map_err(|_| Error::OutOfRange {
        what: "item type id",
        value: object.type_id.0 as i64,
    })?;

    let mut props = Vec::with_capacity(2);
    write_u16_le(&mut props, type_id)?;
    write_attributes(&mut props, &object.attributes)?;

    let mut node = Node::with_props(node_kind::ITEM, props);
    for content in &object.contents {
        node.children.push(project_object(content)?);
    }
    Ok(node)
}

fn project_town(town: &Town) -> Result<Node> {
    let mut props = Vec::with_capacity(9 + town.name.len());
    write_u32_le(&mut props, town.id)?;
    write_string(&mut props, town.name.as_bytes())?;
    write_u16_le(&mut props, town.temple.x)?;
    write_u16_le(&mut props, town.temple.y)?;
    write_u8(&mut props, town.temple.z)?;
    Ok(Node::with_props(node_kind::TOWN, props))
}

/// Append `attributes` so that [`read_attributes`] splits them back exactly
pub fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) -> Result<()> {
    for (index, attribute) in attributes.iter().enumerate() {
        let is_last = index + 1 == attributes.len();
        if is_self_delimiting(attribute, is_last) {
            out.push(attribute.tag);
        } else {
            let len = u16::try_from(attribute.data.len()).map_err(|_| Error::LimitExceeded {
                what: "attribute length",
                limit: u16::MAX as usize,
                actual: attribute.data.len(),
            })?;
            out.push(attr::FRAMED);
            out.push(attribute.tag);
            write_u16_le(out, len)?;
        }
        out.extend_from_slice(&attribute.data);
    }
    Ok(())
}

/// Whether the editor's own framing of `tag ‖ data` yields this record again
fn is_self_delimiting(attribute: &Attribute, is_last: bool) -> bool {
    if attribute.tag == attr::FRAMED {
        return false;
    }
    match value_len(attribute.tag, &attribute.data) {
        Some(len) => len == attribute.data.len(),
        // an undelimited value runs to the end of the props
        None => is_last,
    }
}

/// Rebuild a [`Map`] from a decoded map tree
pub fn unproject(root: &Node) -> Result<Map> {
    expect_kind("file root", node_kind::MAP_HEADER, root.kind)?;

    let mut reader = PropReader::new(&root.props);
    let version = reader.u32("map version")?;
    let width = reader.u16("map width")?;
    let height = reader.u16("map height")?;
    let items_major = reader.u32("items major version")?;
    let items_minor = reader.u32("items minor version")?;
    log::debug!("map version {version}, {width}x{height}, items {items_major}.{items_minor}");

    let data = match root.children.first() {
        Some(node) if node.kind == node_kind::MAP_DATA => node,
        other => {
            return Err(Error::UnexpectedNesting {
                context: "map header",
                expected: node_kind::MAP_DATA,
                found: other.map_or(NODE_END, |node| node.kind),
            });
        }
    };
    for extra in &root.children[1..] {
        log::debug!("skipping node 0x{:02X} after map data", extra.kind);
    }

    let mut header = read_map_data(&data.props)?;
    header.width = width;
    header.height = height;

    let mut map = Map::new(header);
    for child in &data.children {
        match child.kind {
            node_kind::TILE_AREA => read_area(child, &mut map)?,
            node_kind::TOWNS => {
                for town in &child.children {
                    expect_kind("towns", node_kind::TOWN, town.kind)?;
                    map.towns.push(read_town(town)?);
                }
            }
            kind => log::debug!("skipping node 0x{kind:02X} inside map data"),
        }
    }
    Ok(map)
}

fn expect_kind(context: &'static str, expected: u8, found: u8) -> Result<()> {
    if expected != found {
        return Err(Error::UnexpectedNesting {
            context,
            expected,
            found,
        });
    }
    Ok(())
}

/// Map data attributes; every tag the editor defines here carries a string
fn read_map_data(props: &[u8]) -> Result<MapHeader> {
    let mut header = MapHeader::default();
    let mut description: Option<Vec<u8>> = None;

    let mut reader = PropReader::new(props);
    while !reader.is_empty() {
        match reader.u8("map attribute")? {
            attr::DESCRIPTION => {
                let text = reader.string("map description")?;
                // the editor may store several descriptions
                match &mut description {
                    Some(existing) => {
                        existing.push(b'\n');
                        existing.extend(text);
                    }
                    None => description = Some(text),
                }
            }
            attr::EXT_SPAWN_FILE => {
                header.spawn_file = Some(reader.string("spawn file name")?.into());
            }
            attr::EXT_HOUSE_FILE => {
                header.house_file = Some(reader.string("house file name")?.into());
            }
            tag => {
                let value = ByteString::new(reader.string("map attribute value")?);
                log::debug!("skipping map attribute 0x{tag:02X} ({value:?})");
            }
        }
    }

    header.description = ByteString::new(description.unwrap_or_default());
    Ok(header)
}

fn read_area(area: &Node, map: &mut Map) -> Result<()> {
    let mut reader = PropReader::new(&area.props);
    let base_x = reader.u16("tile area x")?;
    let base_y = reader.u16("tile area y")?;
    let z = reader.u8("tile area z")?;

    for child in &area.children {
        if child.kind != node_kind::HOUSETILE {
            expect_kind("tile area", node_kind::TILE, child.kind)?;
        }
        let tile = read_tile(child, base_x, base_y, z)?;
        let position = tile.position;
        if map.insert_tile(tile).is_some() {
            return Err(Error::DuplicateTile(position));
        }
    }
    Ok(())
}

fn read_tile(node: &Node, base_x: u16, base_y: u16, z: u8) -> Result<Tile> {
    let mut reader = PropReader::new(&node.props);
    let x = offset_coordinate("tile x", base_x, reader.u8("tile x")?)?;
    let y = offset_coordinate("tile y", base_y, reader.u8("tile y")?)?;

    let mut tile = Tile::new(Position::new(x, y, z));
    if node.kind == node_kind::HOUSETILE {
        let house_id = reader.u32("house id")?;
        tile.house_id = (house_id != 0).then_some(house_id);
    }

    let mut ground_node = false;
    while !reader.is_empty() {
        let offset = reader.offset();
        match reader.u8("tile attribute")? {
            attr::TILE_FLAGS => tile.flags = reader.u32("tile flags")?,
            attr::ITEM if tile.ground.is_none() && !ground_node => {
                let type_id = reader.u16("inline ground")?;
                tile.ground = Some(Object::new(TypeId::from(type_id)));
            }
            attr::GROUND_NODE if tile.ground.is_none() && !ground_node => ground_node = true,
            attr::ITEM | attr::GROUND_NODE => {
                return Err(Error::format(offset, "tile has more than one ground"));
            }
            // values of unknown tile attributes have no known width
            tag => {
                return Err(Error::format(
                    offset,
                    format!("unknown tile attribute 0x{tag:02X}"),
                ));
            }
        }
    }

    for child in &node.children {
        expect_kind("tile", node_kind::ITEM, child.kind)?;
        tile.items.push(read_item(child)?);
    }
    if ground_node {
        if tile.items.is_empty() {
            return Err(Error::format(
                node.props.len(),
                "tile announces a ground item but has no items",
            ));
        }
        tile.ground = Some(tile.items.remove(0));
    }
    Ok(tile)
}

fn offset_coordinate(what: &'static str, base: u16, local: u8) -> Result<u16> {
    let value = base as i64 + local as i64;
    u16::try_from(value).map_err(|_| Error::OutOfRange { what, value })
}

fn read_item(node: &Node) -> Result<Object> {
    let mut reader = PropReader::new(&node.props);
    let mut object = Object::new(TypeId::from(reader.u16("item type id")?));
    object.attributes = read_attributes(&mut reader)?;

    for child in &node.children {
        expect_kind("item", node_kind::ITEM, child.kind)?;
        object.contents.push(read_item(child)?);
    }
    Ok(object)
}

fn read_town(node: &Node) -> Result<Town> {
    let mut reader = PropReader::new(&node.props);
    let id = reader.u32("town id")?;
    let name = reader.string("town name")?;
    let x = reader.u16("temple x")?;
    let y = reader.u16("temple y")?;
    let z = reader.u8("temple z")?;
    Ok(Town::new(id, name, Position::new(x, y, z)))
}

/// Length of the value following `tag`, if the editor defines one
fn value_len(tag: u8, value: &[u8]) -> Option<usize> {
    let len = match tag {
        attr::COUNT
        | attr::RUNE_CHARGES
        | attr::HOUSEDOORID
        | attr::DECAYING_STATE
        | attr::TIER => 1,
        attr::ACTION_ID | attr::UNIQUE_ID | attr::DEPOT_ID | attr::CHARGES => 2,
        attr::DURATION | attr::WRITTENDATE | attr::SLEEPERGUID | attr::SLEEPSTART => 4,
        attr::TELE_DEST => 5,
        attr::TEXT | attr::DESC | attr::WRITTENBY => {
            let prefix = value.get(..2)?;
            2 + u16::from_le_bytes([prefix[0], prefix[1]]) as usize
        }
        _ => return None,
    };
    (len <= value.len()).then_some(len)
}

/// Split the remaining props into attribute records
///
/// A record with a known tag ends at the editor's value width. A record with
/// an unknown tag, or with a value that does not fit, takes the rest.
pub fn read_attributes(reader: &mut PropReader<'_>) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    while !reader.is_empty() {
        let tag = reader.u8("attribute tag")?;
        if tag == attr::FRAMED {
            let tag = reader.u8("framed attribute tag")?;
            let len = reader.u16("framed attribute length")?;
            let data = reader.bytes(len as usize, "framed attribute value")?;
            attributes.push(Attribute::new(tag, data));
            continue;
        }

        let data = match value_len(tag, reader.remaining()) {
            Some(len) => reader.bytes(len, "attribute value")?,
            None => reader.rest(),
        };
        attributes.push(Attribute::new(tag, data));
    }
    Ok(attributes)
}
