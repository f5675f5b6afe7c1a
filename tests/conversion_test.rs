use claims::{assert_matches, assert_ok};
use insta::assert_debug_snapshot;
use sec_otbm::catalog::{ItemCatalog, ObjectSpecs};
use sec_otbm::convert::{self, ConversionOptions};
use sec_otbm::coords::{BaseOffset, LayerOrder, SectorId};
use sec_otbm::sector::{Sector, SectorTile};
use sec_otbm::tree::{self, projection::attr, projection::node_kind};
use sec_otbm::{Error, Object, TypeId, tile_flags};
use std::fs;
use std::path::Path;

const OBJECTS_SRV: &str = r#"# test objects
TypeID      = 100
Name        = "grass"
Flags       = {Bank}

TypeID      = 205
Name        = "a wooden chair"
Flags       = {Unmove}

TypeID      = 231
Name        = "sand"
Flags       = {Bank}

TypeID      = 1948
Name        = "a parchment"
Flags       = {Text, Take}

TypeID      = 2853
Name        = "a bag"
Flags       = {Container, Take}

TypeID      = 3031
Name        = "a gold coin"
Flags       = {Cumulative, Take}
"#;

fn scenario_sector() -> Sector {
    let mut sector = Sector::new(SectorId::new(1000, 998, 7).unwrap());
    let mut tile = SectorTile::new(3, 4);
    tile.ground = Some(Object::new(TypeId(100)));
    tile.items
        .push(Object::new(TypeId(205)).with_attribute(0x01, vec![0x02]));
    sector.insert_tile(tile).unwrap();
    sector
}

fn write_sector(dir: &Path, sector: &Sector) -> Vec<u8> {
    let bytes = sector.encode().unwrap();
    fs::write(dir.join(sector.id.file_name()), &bytes).unwrap();
    bytes
}

fn write_objects_srv(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("objects.srv");
    fs::write(&path, OBJECTS_SRV).unwrap();
    path
}

#[test]
fn scenario_forward_then_reverse() {
    let dir = tempfile::tempdir().unwrap();
    let sectors = dir.path().join("sectors");
    fs::create_dir(&sectors).unwrap();
    let original = write_sector(&sectors, &scenario_sector());
    let objects = write_objects_srv(dir.path());

    let map_file = dir.path().join("map.otbm");
    let options = ConversionOptions::new();
    let summary = assert_ok!(convert::forward(&sectors, &map_file, &options));
    assert_eq!(
        (summary.sector_count, summary.tile_count, summary.object_count),
        (1, 1, 2)
    );

    // tile at (1000 * 32 + 3, 998 * 32 + 4, 7) holding items 100 and 205
    let root = assert_ok!(tree::decode(&fs::read(&map_file).unwrap()));
    let area = &root.children[0].children[0];
    assert_eq!(area.props, [0x00, 0x7D, 0x00, 0x7C, 7]);
    let tile = &area.children[0];
    assert_eq!(tile.kind, node_kind::TILE);
    assert_eq!(tile.props, [3, 0xC4, attr::GROUND_NODE]);
    let items: Vec<_> = tile.children.iter().map(|item| item.props.clone()).collect();
    assert_eq!(items, [vec![100, 0], vec![205, 0, 0x01, 0x02]]);

    let restored = dir.path().join("restored");
    let summary = assert_ok!(convert::reverse(&map_file, &restored, &objects, &options));
    assert_eq!(summary.files, [restored.join("1000-0998-07.sec")]);
    assert_eq!(fs::read(&summary.files[0]).unwrap(), original);
}

fn varied_sectors() -> Vec<Sector> {
    let mut a = Sector::new(SectorId::new(1000, 1000, 7).unwrap());
    let mut tile = SectorTile::new(0, 0);
    tile.ground = Some(Object::new(TypeId(231)));
    tile.flags = tile_flags::PROTECTION_ZONE | tile_flags::NO_LOGOUT;
    tile.house_id = Some(42);
    tile.items.push(
        Object::new(TypeId(2853))
            .with_attribute(attr::ACTION_ID, vec![0x39, 0x05])
            .with_content(Object::new(TypeId(3031)).with_attribute(attr::COUNT, vec![100]))
            .with_content(
                Object::new(TypeId(2853)).with_content(Object::new(TypeId(1948)).with_attribute(
                    attr::TEXT,
                    b"\x0B\x00hello world".to_vec(),
                )),
            ),
    );
    a.insert_tile(tile).unwrap();

    let mut tile = SectorTile::new(31, 31);
    tile.items.push(Object::new(TypeId(205)));
    tile.items.push(Object::new(TypeId(205)).with_attribute(0xFE, vec![0xFF, 0xFD]));
    a.insert_tile(tile).unwrap();

    // flags only
    let mut tile = SectorTile::new(16, 2);
    tile.flags = tile_flags::REFRESH;
    a.insert_tile(tile).unwrap();

    let mut b = Sector::new(SectorId::new(1001, 1000, 0).unwrap());
    let mut tile = SectorTile::new(5, 9);
    tile.ground = Some(Object::new(TypeId(100)).with_attribute(attr::UNIQUE_ID, vec![1, 2]));
    b.insert_tile(tile).unwrap();

    // ground of a type not flagged as ground
    let mut tile = SectorTile::new(6, 9);
    tile.ground = Some(Object::new(TypeId(205)));
    b.insert_tile(tile).unwrap();

    // ground type stacked on a tile without ground
    let mut tile = SectorTile::new(7, 9);
    tile.items.push(Object::new(TypeId(100)));
    tile.items.push(Object::new(TypeId(205)));
    b.insert_tile(tile).unwrap();

    let mut c = Sector::new(SectorId::new(992, 1015, 15).unwrap());
    let mut tile = SectorTile::new(7, 7);
    tile.ground = Some(Object::new(TypeId(100)));
    tile.items.push(
        Object::new(TypeId(205))
            .with_attribute(0xEE, vec![0x01])
            .with_attribute(attr::COUNT, vec![0x05]),
    );
    tile.items
        .push(Object::new(TypeId(205)).with_attribute(attr::ACTION_ID, vec![0x39, 0x05, 0x00]));
    c.insert_tile(tile).unwrap();

    vec![a, b, c]
}

#[test]
fn round_trip_preserves_sectors() {
    let specs = assert_ok!(ObjectSpecs::parse(OBJECTS_SRV));
    let sectors = varied_sectors();

    let configurations = [
        ConversionOptions::new(),
        ConversionOptions::new()
            .with_base_offset(BaseOffset::new(-24576, -24576))
            .clone(),
        ConversionOptions::new()
            .with_base_offset(BaseOffset::new(1000, -3))
            .with_layer_order(LayerOrder::Inverted)
            .with_description("round trip")
            .clone(),
    ];
    for options in configurations {
        let bytes = assert_ok!(convert::forward_sectors(&sectors, &options));
        let restored = assert_ok!(convert::reverse_bytes(&bytes, &specs, &options));

        let mut expected = sectors.clone();
        expected.sort_by_key(|sector| sector.id);
        assert_eq!(restored, expected);

        let encoded: Vec<_> = restored.iter().map(|s| s.encode().unwrap()).collect();
        let original: Vec<_> = expected.iter().map(|s| s.encode().unwrap()).collect();
        assert_eq!(encoded, original);
    }
}

#[test]
fn unknown_type_id_writes_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let objects = write_objects_srv(dir.path());

    let mut sectors = varied_sectors();
    let mut tile = SectorTile::new(1, 1);
    tile.items.push(Object::new(TypeId(65000)));
    sectors[0].insert_tile(tile).unwrap();

    let map_file = dir.path().join("map.otbm");
    let options = ConversionOptions::new();
    fs::write(&map_file, convert::forward_sectors(&sectors, &options).unwrap()).unwrap();

    let output = dir.path().join("out");
    let err = convert::reverse(&map_file, &output, &objects, &options).unwrap_err();
    assert_matches!(
        err.root_cause(),
        Error::UnknownTypeId {
            type_id: TypeId(65000),
            ..
        }
    );
    assert!(!output.exists());
}

#[test]
fn sector_file_name_must_match_header() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = scenario_sector().encode().unwrap();
    fs::write(dir.path().join("1000-0998-06.sec"), bytes).unwrap();

    let map_file = dir.path().join("map.otbm");
    let err = convert::forward(dir.path(), &map_file, &ConversionOptions::new()).unwrap_err();
    assert_matches!(err.root_cause(), Error::Format { offset: 6, .. });
    assert!(!map_file.exists());
}

#[test]
fn corrupt_sector_is_reported_with_its_path() {
    let dir = tempfile::tempdir().unwrap();
    write_sector(dir.path(), &scenario_sector());
    let broken = dir.path().join("1000-0999-07.sec");
    fs::write(&broken, b"TSEC\x01\x00").unwrap();

    let err = convert::forward(dir.path(), dir.path().join("map.otbm"), &ConversionOptions::new())
        .unwrap_err();
    match &err {
        Error::InFile { path, source } => {
            assert_eq!(path, &broken);
            assert_debug_snapshot!(source, @r#"
            TruncatedInput {
                offset: 6,
                context: "sector x",
            }
            "#);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn catalog_is_deterministic() {
    let specs = assert_ok!(ObjectSpecs::parse(OBJECTS_SRV));
    let mut shuffled = specs.specs().to_vec();
    shuffled.rotate_left(2);
    shuffled.swap(0, 3);

    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let catalog = assert_ok!(ItemCatalog::generate(specs.specs()));
    assert_ok!(catalog.write_to_dir(&first, "objects.srv"));
    assert_ok!(ItemCatalog::generate(&shuffled).and_then(|c| c.write_to_dir(&second, "objects.srv")));

    for name in ["items.otb", "catalog.json"] {
        assert_eq!(
            fs::read(first.join(name)).unwrap(),
            fs::read(second.join(name)).unwrap()
        );
    }

    let root = assert_ok!(tree::decode(&fs::read(first.join("items.otb")).unwrap()));
    let kinds: Vec<_> = root.children.iter().map(|node| node.kind).collect();
    assert_eq!(kinds, [1, 0, 1, 0, 2, 0]);
}
