//! Forward (sectors → tree map) and reverse (tree map → sectors) pipelines

use crate::catalog::ObjectSpecs;
use crate::coords::{BaseOffset, CoordinateMapper, LayerOrder, SectorId};
use crate::error::{Error, Result};
use crate::sector::{Sector, SectorTile};
use crate::tree::{self, MAP_IDENTIFIER};
use crate::types::{DEFAULT_MAP_SIZE, Map, MapHeader, Tile, Town};
use crate::utils::ByteString;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings shared by both conversion directions
///
/// The same options must be used for a forward conversion and the reverse
/// conversion of its output.
///
/// # Example
///
/// ```
/// use sec_otbm::convert::ConversionOptions;
/// use sec_otbm::coords::BaseOffset;
///
/// let mut options = ConversionOptions::new();
/// options
///     .with_base_offset(BaseOffset::new(-24576, -24576))
///     .with_description("Tibia 7.7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    base_offset: BaseOffset,
    normalize: bool,
    layer_order: LayerOrder,
    description: String,
    width: u16,
    height: u16,
    spawn_file: Option<String>,
    house_file: Option<String>,
    #[serde(skip)]
    towns: Vec<Town>,
    classify_grounds: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            base_offset: BaseOffset::ZERO,
            normalize: true,
            layer_order: LayerOrder::default(),
            description: String::new(),
            width: DEFAULT_MAP_SIZE,
            height: DEFAULT_MAP_SIZE,
            spawn_file: None,
            house_file: None,
            towns: Vec::new(),
            classify_grounds: false,
        }
    }
}

impl ConversionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset added to sector derived coordinates
    ///
    /// Returns `&mut self` to allow method chaining.
    pub fn with_base_offset(&mut self, base_offset: BaseOffset) -> &mut Self {
        self.base_offset = base_offset;
        self
    }

    /// Apply (default) or ignore the base offset
    ///
    /// Returns `&mut self` to allow method chaining.
    pub fn normalize(&mut self, normalize: bool) -> &mut Self {
        self.normalize = normalize;
        self
    }

    /// Returns `&mut self` to allow method chaining.
    pub fn with_layer_order(&mut self, layer_order: LayerOrder) -> &mut Self {
        self.layer_order = layer_order;
        self
    }

    /// Map description stored in the tree map
    ///
    /// Returns `&mut self` to allow method chaining.
    pub fn with_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    /// Map dimensions stored in the tree map header (default 65535×65535)
    ///
    /// Returns `&mut self` to allow method chaining.
    pub fn with_dimensions(&mut self, width: u16, height: u16) -> &mut Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Spawn and house file names the editor loads next to the map
    ///
    /// Only the names are stored; the files themselves come from elsewhere.
    ///
    /// Returns `&mut self` to allow method chaining.
    pub fn with_external_files(
        &mut self,
        spawn_file: impl Into<String>,
        house_file: impl Into<String>,
    ) -> &mut Self {
        self.spawn_file = Some(spawn_file.into());
        self.house_file = Some(house_file.into());
        self
    }

    /// Towns written into the tree map, see [`crate::towns::load`]
    ///
    /// Returns `&mut self` to allow method chaining.
    pub fn with_towns(&mut self, towns: Vec<Town>) -> &mut Self {
        self.towns = towns;
        self
    }

    /// Decide grounds of unmarked tiles by the object specifications
    ///
    /// Maps saved by the editor may list a ground as the first item of a tile
    /// without marking it. When enabled, the reverse conversion moves such a
    /// first item into the ground slot if its specification carries the
    /// ground flag. Leave disabled for maps produced by [`forward`], which
    /// mark every ground.
    ///
    /// Returns `&mut self` to allow method chaining.
    pub fn with_ground_classification(&mut self, enabled: bool) -> &mut Self {
        self.classify_grounds = enabled;
        self
    }

    /// Offset actually applied, `BaseOffset::ZERO` unless normalizing
    pub fn effective_offset(&self) -> BaseOffset {
        if self.normalize {
            self.base_offset
        } else {
            BaseOffset::ZERO
        }
    }

    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.effective_offset(), self.layer_order)
    }

    fn header(&self) -> MapHeader {
        MapHeader {
            width: self.width,
            height: self.height,
            description: ByteString::from_cp1252(&self.description),
            spawn_file: self.spawn_file.as_deref().map(ByteString::from_cp1252),
            house_file: self.house_file.as_deref().map(ByteString::from_cp1252),
        }
    }
}

/// Result of a forward conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSummary {
    pub sector_count: usize,
    pub tile_count: usize,
    pub object_count: usize,
    pub town_count: usize,
    pub bytes_written: usize,
}

/// Result of a reverse conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseSummary {
    pub sector_count: usize,
    pub tile_count: usize,
    pub object_count: usize,
    /// Sector files written, in sector id order
    pub files: Vec<PathBuf>,
}

/// Merge sectors into one map
///
/// Sectors sharing an id are merged; a tile present in both fails with
/// `DuplicateTile`.
pub fn sectors_to_map(sectors: &[Sector], options: &ConversionOptions) -> Result<Map> {
    let mapper = options.mapper();
    let mut map = Map::new(options.header());
    map.towns = options.towns.clone();

    for sector in sectors {
        for local in sector.tiles() {
            let position = mapper.to_global(sector.id, local.offset_x, local.offset_y)?;
            let tile = Tile {
                position,
                flags: local.flags,
                house_id: local.house_id,
                ground: local.ground.clone(),
                items: local.items.clone(),
            };
            if map.insert_tile(tile).is_some() {
                return Err(Error::DuplicateTile(position));
            }
        }
    }
    Ok(map)
}

/// Split a map into sectors, ordered by sector id
pub fn map_to_sectors(map: Map, options: &ConversionOptions) -> Result<Vec<Sector>> {
    let mapper = options.mapper();
    let mut sectors: BTreeMap<SectorId, Sector> = BTreeMap::new();
    if !map.towns.is_empty() {
        log::debug!("sector files hold no towns, dropping {}", map.towns.len());
    }

    for tile in map.into_tiles() {
        let local = mapper.to_local(tile.position)?;
        let sector = sectors
            .entry(local.sector)
            .or_insert_with(|| Sector::new(local.sector));
        sector.insert_tile(SectorTile {
            offset_x: local.offset_x,
            offset_y: local.offset_y,
            flags: tile.flags,
            house_id: tile.house_id,
            ground: tile.ground,
            items: tile.items,
        })?;
    }
    Ok(sectors.into_values().collect())
}

/// Encode decoded sectors as a tree map file
pub fn forward_sectors(sectors: &[Sector], options: &ConversionOptions) -> Result<Vec<u8>> {
    let map = sectors_to_map(sectors, options)?;
    let root = tree::project(&map)?;
    tree::encode(&root, MAP_IDENTIFIER)
}

/// Decode a tree map file into sectors
///
/// Every type id must be defined in `specs`. See
/// [`ConversionOptions::with_ground_classification`] for tiles whose ground is
/// not marked.
pub fn reverse_bytes(
    bytes: &[u8],
    specs: &ObjectSpecs,
    options: &ConversionOptions,
) -> Result<Vec<Sector>> {
    let root = tree::decode(bytes)?;
    let mut map = tree::unproject(&root)?;
    map.validate_type_ids(|type_id| specs.contains(type_id))?;
    if options.classify_grounds {
        map.classify_ground(|type_id| specs.is_ground(type_id));
    }
    map_to_sectors(map, options)
}

/// Convert every `*.sec` file in `sector_dir` into the tree map `output`
pub fn forward(
    sector_dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &ConversionOptions,
) -> Result<ForwardSummary> {
    let sector_dir = sector_dir.as_ref();
    let output = output.as_ref();

    let paths = sector_files(sector_dir)?;
    if paths.is_empty() {
        log::warn!("no sector files found in {}", sector_dir.display());
    }

    let sectors = paths
        .par_iter()
        .map(|path| read_sector(path))
        .collect::<Result<Vec<_>>>()?;

    let map = sectors_to_map(&sectors, options)?;
    let bytes = tree::encode(&tree::project(&map)?, MAP_IDENTIFIER)?;
    write_file(output, &bytes)?;

    let summary = ForwardSummary {
        sector_count: sectors.len(),
        tile_count: map.tile_count(),
        object_count: map.object_count(),
        town_count: map.towns.len(),
        bytes_written: bytes.len(),
    };
    log::info!(
        "converted {} sectors ({} tiles, {} objects) into {}",
        summary.sector_count,
        summary.tile_count,
        summary.object_count,
        output.display()
    );
    Ok(summary)
}

/// Convert the tree map `input` back into sector files in `output_dir`
///
/// Every sector is encoded before the first file is written, so decoding and
/// encoding errors leave `output_dir` untouched. If writing fails part-way,
/// the files written so far are removed again, along with `output_dir` if
/// this call created it. Files that were overwritten are not restored.
pub fn reverse(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    object_specs: impl AsRef<Path>,
    options: &ConversionOptions,
) -> Result<ReverseSummary> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();

    let specs = ObjectSpecs::from_path(object_specs)?;
    let bytes = fs::read(input).map_err(|err| Error::from(err).in_file(input))?;
    let sectors = reverse_bytes(&bytes, &specs, options).map_err(|err| err.in_file(input))?;

    let encoded = sectors
        .par_iter()
        .map(|sector| {
            let path = output_dir.join(sector.id.file_name());
            match sector.encode() {
                Ok(bytes) => Ok((path, bytes)),
                Err(err) => Err(err.in_file(path)),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let created_dir = !output_dir.exists();
    fs::create_dir_all(output_dir).map_err(|err| Error::from(err).in_file(output_dir))?;
    let mut files = Vec::with_capacity(encoded.len());
    for (path, bytes) in encoded {
        if let Err(err) = write_file(&path, &bytes) {
            discard(&files, created_dir.then_some(output_dir));
            return Err(err);
        }
        log::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
        files.push(path);
    }

    let summary = ReverseSummary {
        sector_count: sectors.len(),
        tile_count: sectors.iter().map(Sector::tile_count).sum(),
        object_count: sectors
            .iter()
            .flat_map(|sector| sector.tiles())
            .flat_map(|tile| tile.ground.iter().chain(&tile.items))
            .map(|object| {
                let mut count = 0;
                object.walk(&mut |_| count += 1);
                count
            })
            .sum(),
        files,
    };
    log::info!(
        "wrote {} sector files ({} tiles) to {}",
        summary.sector_count,
        summary.tile_count,
        output_dir.display()
    );
    Ok(summary)
}

/// Remove the output of a failed reverse conversion
fn discard(files: &[PathBuf], created_dir: Option<&Path>) {
    for path in files {
        if let Err(err) = fs::remove_file(path) {
            log::warn!("could not remove {}: {err}", path.display());
        }
    }
    if let Some(dir) = created_dir {
        if let Err(err) = fs::remove_dir(dir) {
            log::warn!("could not remove {}: {err}", dir.display());
        }
    }
}

/// `*.sec` files in `dir`, sorted by name
pub fn sector_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| Error::from(err).in_file(dir))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| Error::from(err).in_file(dir))?.path();
        let is_sector = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sec"));
        if is_sector && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Decode one sector file, checking its header against the file name
pub fn read_sector(path: &Path) -> Result<Sector> {
    let bytes = fs::read(path).map_err(|err| Error::from(err).in_file(path))?;
    let sector = Sector::decode(&bytes).map_err(|err| err.in_file(path))?;

    let named = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(SectorId::from_file_name);
    if let Some(named) = named {
        if named != sector.id {
            let reason = format!(
                "header describes sector {} but the file is named {}",
                sector.id.file_name(),
                named.file_name()
            );
            return Err(Error::format(6, reason).in_file(path));
        }
    }

    log::debug!("decoded {} ({} tiles)", path.display(), sector.tile_count());
    Ok(sector)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| Error::from(err).in_file(parent))?;
    }
    fs::write(path, bytes).map_err(|err| Error::from(err).in_file(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Object, Position, TypeId};
    use claims::{assert_matches, assert_ok};

    fn sector_with_tile(x: u16, y: u16, offset: (u8, u8), type_id: u32) -> Sector {
        let mut sector = Sector::new(SectorId::new(x, y, 7).unwrap());
        let mut tile = SectorTile::new(offset.0, offset.1);
        tile.items.push(Object::new(TypeId(type_id)));
        sector.insert_tile(tile).unwrap();
        sector
    }

    #[test]
    fn options_builder() {
        let mut options = ConversionOptions::new();
        options
            .with_base_offset(BaseOffset::new(-100, 20))
            .with_layer_order(LayerOrder::Inverted)
            .with_dimensions(2048, 1024)
            .with_external_files("map-spawn.xml", "map-house.xml");
        assert_eq!(options.effective_offset(), BaseOffset::new(-100, 20));

        options.normalize(false);
        assert_eq!(options.effective_offset(), BaseOffset::ZERO);
        assert_eq!(options.mapper().layer_order, LayerOrder::Inverted);

        let header = options.header();
        assert_eq!((header.width, header.height), (2048, 1024));
        assert_eq!(header.spawn_file, Some("map-spawn.xml".into()));
    }

    #[test]
    fn options_load_from_json() {
        let options: ConversionOptions =
            assert_ok!(serde_json::from_str(r#"{"base_offset": {"x": 5, "y": -5}}"#));
        assert_eq!(options.effective_offset(), BaseOffset::new(5, -5));
        assert_eq!(options.width, DEFAULT_MAP_SIZE);
    }

    #[test]
    fn sectors_to_map_applies_offset() {
        let mut options = ConversionOptions::new();
        options.with_base_offset(BaseOffset::new(-32000, 10));

        let map = assert_ok!(sectors_to_map(&[sector_with_tile(1000, 0, (3, 4), 1)], &options));
        assert!(map.tile(Position::new(3, 14, 7)).is_some());
    }

    #[test]
    fn overlapping_sectors_fail() {
        let sectors = [
            sector_with_tile(10, 10, (1, 1), 1),
            sector_with_tile(10, 10, (1, 1), 2),
        ];
        assert_matches!(
            sectors_to_map(&sectors, &ConversionOptions::default()),
            Err(Error::DuplicateTile(_))
        );
    }

    #[test]
    fn map_to_sectors_groups_by_sector() {
        let sectors = [
            sector_with_tile(11, 10, (0, 0), 1),
            sector_with_tile(10, 10, (31, 31), 2),
            sector_with_tile(10, 10, (0, 5), 3),
        ];
        let options = ConversionOptions::default();
        let map = assert_ok!(sectors_to_map(&sectors, &options));
        let restored = assert_ok!(map_to_sectors(map, &options));

        let summary: Vec<_> = restored
            .iter()
            .map(|s| (s.id.x, s.id.y, s.tile_count()))
            .collect();
        assert_eq!(summary, [(10, 10, 2), (11, 10, 1)]);
    }

    #[test]
    fn forward_writes_towns() {
        let mut options = ConversionOptions::new();
        options.with_towns(vec![Town::new(1, "Thais", Position::new(321, 321, 7))]);

        let map = assert_ok!(sectors_to_map(&[sector_with_tile(10, 10, (1, 1), 1)], &options));
        assert_eq!(map.towns.len(), 1);

        let bytes = assert_ok!(forward_sectors(&[sector_with_tile(10, 10, (1, 1), 1)], &options));
        let restored = assert_ok!(tree::unproject(&assert_ok!(tree::decode(&bytes))));
        assert_eq!(restored.towns, map.towns);
    }

    #[test]
    fn ground_classification_is_opt_in() {
        // an unmarked first item, as the editor may save it
        let mut tile = tree::Node::with_props(tree::projection::node_kind::TILE, vec![1, 1]);
        tile.children.push(tree::Node::with_props(
            tree::projection::node_kind::ITEM,
            vec![100, 0],
        ));
        let mut area =
            tree::Node::with_props(tree::projection::node_kind::TILE_AREA, vec![0, 1, 0, 1, 7]);
        area.children.push(tile);
        let mut data = tree::Node::new(tree::projection::node_kind::MAP_DATA);
        data.children.push(area);
        let mut root = tree::Node::with_props(tree::projection::node_kind::MAP_HEADER, vec![0; 16]);
        root.children.push(data);
        let bytes = assert_ok!(tree::encode(&root, MAP_IDENTIFIER));

        let specs = assert_ok!(ObjectSpecs::parse("TypeID = 100\nName = \"grass\"\nFlags = {Bank}\n"));
        let mut options = ConversionOptions::new();

        let sectors = assert_ok!(reverse_bytes(&bytes, &specs, &options));
        let tile = sectors[0].tile(1, 1).unwrap();
        assert_eq!((tile.ground.is_some(), tile.items.len()), (false, 1));

        options.with_ground_classification(true);
        let sectors = assert_ok!(reverse_bytes(&bytes, &specs, &options));
        let tile = sectors[0].tile(1, 1).unwrap();
        assert_eq!(tile.ground, Some(Object::new(TypeId(100))));
        assert!(tile.items.is_empty());
    }

    #[test]
    fn failed_write_removes_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let objects = dir.path().join("objects.srv");
        fs::write(&objects, "TypeID = 1\nName = \"a\"\nTypeID = 2\nName = \"b\"\n").unwrap();

        let options = ConversionOptions::new();
        let sectors = [
            sector_with_tile(10, 10, (0, 0), 1),
            sector_with_tile(11, 10, (0, 0), 2),
        ];
        let map_file = dir.path().join("map.otbm");
        fs::write(&map_file, assert_ok!(forward_sectors(&sectors, &options))).unwrap();

        // the second sector file cannot be created
        let output = dir.path().join("out");
        fs::create_dir_all(output.join("0011-0010-07.sec")).unwrap();

        let err = reverse(&map_file, &output, &objects, &options).unwrap_err();
        assert_matches!(err.root_cause(), Error::Io(_));
        assert!(!output.join("0010-0010-07.sec").exists());
        assert!(output.join("0011-0010-07.sec").is_dir());
    }

    #[test]
    fn reverse_bytes_rejects_unknown_type_ids() {
        let bytes = assert_ok!(forward_sectors(
            &[sector_with_tile(10, 10, (1, 1), 65000)],
            &ConversionOptions::default()
        ));
        let specs = assert_ok!(ObjectSpecs::parse("TypeID = 100\nName = \"grass\"\n"));

        let err = reverse_bytes(&bytes, &specs, &ConversionOptions::default()).unwrap_err();
        assert_matches!(
            err,
            Error::UnknownTypeId {
                type_id: TypeId(65000),
                position: Position { x: 321, y: 321, z: 7 },
            }
        );
    }
}
