//! Item catalog derived from the object specification source
//!
//! The catalog is written as an `items.otb` style node tree (the same framing
//! as the map files, see [`crate::tree`]) plus a JSON manifest with the
//! editor's item list.

mod manifest;
mod source;

pub use self::manifest::{CatalogManifest, ManifestItem};
pub use self::source::{GROUND_FLAG, ObjectSpec, ObjectSpecs};

use crate::error::{Error, Result};
use crate::tree::{self, CATALOG_IDENTIFIER, Node};
use crate::types::TypeId;
use crate::utils::ByteString;
use crate::utils::io::{write_u16_le, write_u32_le};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::Path;

pub const MAJOR_VERSION: u32 = 1;
pub const MINOR_VERSION: u32 = 100;
pub const BUILD_NUMBER: u32 = 1;

/// Client version the catalog describes
pub const CLIENT_VERSION: &str = "7.70-cipsoft";

/// Size of the NUL padded version string in the root node
const VERSION_STRING_LEN: usize = 128;

/// Default speed of ground items
pub const DEFAULT_GROUND_SPEED: u16 = 150;

pub const ITEMS_FILE_NAME: &str = "items.otb";
pub const MANIFEST_FILE_NAME: &str = "catalog.json";

const ROOT_ATTR_VERSION: u8 = 0x01;
const ITEM_ATTR_SERVER_ID: u8 = 0x10;
const ITEM_ATTR_CLIENT_ID: u8 = 0x11;
const ITEM_ATTR_NAME: u8 = 0x12;
const ITEM_ATTR_SPEED: u8 = 0x14;

/// Item group, written as the node kind of each catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemGroup {
    None = 0x00,
    Ground = 0x01,
    Container = 0x02,
    Rune = 0x06,
    Splash = 0x0B,
}

impl ItemGroup {
    pub fn from_spec(spec: &ObjectSpec) -> Self {
        if spec.has_flag(GROUND_FLAG) {
            ItemGroup::Ground
        } else if spec.has_flag("Container") {
            ItemGroup::Container
        } else if spec.has_flag("Splash") {
            ItemGroup::Splash
        } else if spec.has_flag("Rune") || spec.has_flag("MagicEffect") {
            ItemGroup::Rune
        } else {
            ItemGroup::None
        }
    }
}

/// Item type shown by the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorKind {
    Key,
    Container,
    Splash,
    Teleport,
    Door,
    Depot,
}

impl EditorKind {
    pub fn from_spec(spec: &ObjectSpec) -> Option<Self> {
        let any = |flags: &[&str]| flags.iter().any(|flag| spec.has_flag(flag));
        if any(&["Key"]) {
            Some(EditorKind::Key)
        } else if any(&["Container"]) {
            Some(EditorKind::Container)
        } else if any(&["Splash", "LiquidContainer", "LiquidSource"]) {
            Some(EditorKind::Splash)
        } else if any(&["Teleport"]) {
            Some(EditorKind::Teleport)
        } else if any(&["Door", "Hatch", "Gate"]) {
            Some(EditorKind::Door)
        } else if any(&["Depot"]) {
            Some(EditorKind::Depot)
        } else {
            None
        }
    }
}

/// One catalog record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub type_id: TypeId,
    /// Full name as in the specification source
    pub name: String,
    pub group: ItemGroup,
    pub kind: Option<EditorKind>,
    pub speed: Option<u16>,
}

impl CatalogItem {
    fn from_spec(spec: &ObjectSpec) -> Self {
        let group = ItemGroup::from_spec(spec);
        Self {
            type_id: spec.type_id,
            name: spec.name.clone(),
            group,
            kind: EditorKind::from_spec(spec),
            speed: (group == ItemGroup::Ground).then_some(DEFAULT_GROUND_SPEED),
        }
    }

    /// Split a leading `a ` / `an ` from the name
    pub fn article(&self) -> (Option<&str>, &str) {
        for article in ["a", "an"] {
            let prefix_len = article.len() + 1;
            let matches = self
                .name
                .get(..prefix_len)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&format!("{article} ")));
            if matches {
                return (Some(article), &self.name[prefix_len..]);
            }
        }
        (None, &self.name)
    }
}

/// Generated item catalog, ordered by type id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemCatalog {
    items: BTreeMap<TypeId, CatalogItem>,
}

impl ItemCatalog {
    /// Build the catalog, one record per distinct type id
    ///
    /// Identical duplicate definitions are merged, differing ones fail with
    /// `DuplicateTypeId`. The result does not depend on the order of `specs`.
    pub fn generate(specs: &[ObjectSpec]) -> Result<Self> {
        let mut seen: BTreeMap<TypeId, &ObjectSpec> = BTreeMap::new();
        for spec in specs {
            match seen.entry(spec.type_id) {
                Entry::Vacant(entry) => {
                    entry.insert(spec);
                }
                Entry::Occupied(entry) => {
                    if *entry.get() != spec {
                        return Err(Error::DuplicateTypeId(spec.type_id));
                    }
                }
            }
        }

        let items = seen
            .into_iter()
            .map(|(type_id, spec)| (type_id, CatalogItem::from_spec(spec)))
            .collect();
        Ok(Self { items })
    }

    pub fn get(&self, type_id: TypeId) -> Option<&CatalogItem> {
        self.items.get(&type_id)
    }

    /// Records in ascending type id order
    pub fn items(&self) -> impl Iterator<Item = &CatalogItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialize as `items.otb`
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut root = Node::with_props(0, root_props()?);
        for item in self.items.values() {
            root.children.push(item_node(item)?);
        }
        tree::encode(&root, CATALOG_IDENTIFIER)
    }

    pub fn manifest(&self, source: impl Into<String>) -> CatalogManifest {
        CatalogManifest::new(self, source.into())
    }

    /// Write `items.otb` and `catalog.json` into `dir`
    ///
    /// Both files are fully built before either is written.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>, source: impl Into<String>) -> Result<()> {
        let dir = dir.as_ref();
        let items = self.write()?;
        let manifest = self.manifest(source).to_json()?;

        std::fs::create_dir_all(dir).map_err(|err| Error::from(err).in_file(dir))?;
        for (name, bytes) in [(ITEMS_FILE_NAME, items), (MANIFEST_FILE_NAME, manifest.into_bytes())] {
            let path = dir.join(name);
            std::fs::write(&path, bytes).map_err(|err| Error::from(err).in_file(&path))?;
        }

        log::info!("wrote item catalog with {} items to {}", self.len(), dir.display());
        Ok(())
    }
}

fn root_props() -> Result<Vec<u8>> {
    let version = format!("OTB {MAJOR_VERSION}.0.0-{CLIENT_VERSION}");
    let mut version_bytes = version.into_bytes();
    version_bytes.resize(VERSION_STRING_LEN, 0);

    let mut props = Vec::with_capacity(7 + 12 + VERSION_STRING_LEN);
    write_u32_le(&mut props, 0)?;
    props.push(ROOT_ATTR_VERSION);
    write_u16_le(&mut props, (12 + VERSION_STRING_LEN) as u16)?;
    write_u32_le(&mut props, MAJOR_VERSION)?;
    write_u32_le(&mut props, MINOR_VERSION)?;
    write_u32_le(&mut props, BUILD_NUMBER)?;
    props.extend(version_bytes);
    Ok(props)
}

fn item_node(item: &CatalogItem) -> Result<Node> {
    let id = u16::try_from(item.type_id.0).map_err(|_| Error::OutOfRange {
        what: "catalog type id",
        value: item.type_id.0 as i64,
    })?;
    let name = ByteString::from_cp1252(&item.name);
    let name_len = u16::try_from(name.len()).map_err(|_| Error::LimitExceeded {
        what: "item name length",
        limit: u16::MAX as usize,
        actual: name.len(),
    })?;

    let mut props = Vec::with_capacity(22 + name.len());
    write_u32_le(&mut props, 0)?;
    for attr in [ITEM_ATTR_SERVER_ID, ITEM_ATTR_CLIENT_ID] {
        props.push(attr);
        write_u16_le(&mut props, 2)?;
        write_u16_le(&mut props, id)?;
    }
    props.push(ITEM_ATTR_NAME);
    write_u16_le(&mut props, name_len)?;
    props.extend_from_slice(name.as_bytes());
    if let Some(speed) = item.speed {
        props.push(ITEM_ATTR_SPEED);
        write_u16_le(&mut props, 2)?;
        write_u16_le(&mut props, speed)?;
    }

    Ok(Node::with_props(item.group as u8, props))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_matches, assert_ok};

    fn specs() -> Vec<ObjectSpec> {
        vec![
            ObjectSpec::new(TypeId(2853), "a bag").with_flag("Container"),
            ObjectSpec::new(TypeId(100), "grass").with_flag("Bank"),
            ObjectSpec::new(TypeId(1948), "an old parchment").with_flag("Text"),
            ObjectSpec::new(TypeId(0), ""),
        ]
    }

    #[test]
    fn one_record_per_type_id() {
        let mut input = specs();
        input.push(input[1].clone());
        let catalog = assert_ok!(ItemCatalog::generate(&input));

        let ids: Vec<_> = catalog.items().map(|item| item.type_id.0).collect();
        assert_eq!(ids, [0, 100, 1948, 2853]);

        let grass = catalog.get(TypeId(100)).unwrap();
        assert_eq!(grass.group, ItemGroup::Ground);
        assert_eq!(grass.speed, Some(DEFAULT_GROUND_SPEED));

        let bag = catalog.get(TypeId(2853)).unwrap();
        assert_eq!(bag.group, ItemGroup::Container);
        assert_eq!(bag.kind, Some(EditorKind::Container));
        assert_eq!(bag.article(), (Some("a"), "bag"));
        assert_eq!(
            catalog.get(TypeId(1948)).unwrap().article(),
            (Some("an"), "old parchment")
        );
    }

    #[test]
    fn conflicting_duplicates_fail() {
        let mut input = specs();
        input.push(ObjectSpec::new(TypeId(100), "dirt").with_flag("Bank"));
        assert_matches!(
            ItemCatalog::generate(&input),
            Err(Error::DuplicateTypeId(TypeId(100)))
        );
    }

    #[test]
    fn output_independent_of_input_order() {
        let forward = assert_ok!(ItemCatalog::generate(&specs()));
        let mut reversed = specs();
        reversed.reverse();
        let backward = assert_ok!(ItemCatalog::generate(&reversed));

        assert_eq!(forward, backward);
        assert_eq!(assert_ok!(forward.write()), assert_ok!(backward.write()));
    }

    #[test]
    fn written_catalog_layout() {
        let catalog = assert_ok!(ItemCatalog::generate(&[
            ObjectSpec::new(TypeId(100), "grass").with_flag("Bank")
        ]));
        let bytes = assert_ok!(catalog.write());
        let root = assert_ok!(tree::decode(&bytes));

        assert_eq!(&bytes[..4], &CATALOG_IDENTIFIER);
        assert_eq!(root.kind, 0);
        assert_eq!(root.props.len(), 4 + 1 + 2 + 140);
        assert_eq!(&root.props[4..7], &[0x01, 140, 0]);
        assert_eq!(&root.props[19..41], b"OTB 1.0.0-7.70-cipsoft");
        assert!(root.props[41..].iter().all(|&b| b == 0));

        let item = &root.children[0];
        assert_eq!(item.kind, ItemGroup::Ground as u8);
        assert_eq!(
            item.props,
            [
                0, 0, 0, 0, // flags
                0x10, 2, 0, 100, 0, // server id
                0x11, 2, 0, 100, 0, // client id
                0x12, 5, 0, b'g', b'r', b'a', b's', b's', // name
                0x14, 2, 0, 150, 0, // speed
            ]
        );
    }

    #[test]
    fn rejects_wide_type_ids() {
        let catalog = assert_ok!(ItemCatalog::generate(&[ObjectSpec::new(TypeId(70000), "x")]));
        assert_matches!(catalog.write(), Err(Error::OutOfRange { value: 70000, .. }));
    }
}
