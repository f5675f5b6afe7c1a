//! Towns of the legacy world data
//!
//! Town ids and names come from the `Depot` lines of `map.dat`. The temple a
//! town's players respawn at is taken from the `Hometeleporters` section of
//! `moveuse.dat` when present, else from the town's `Mark` in `map.dat`.
//!
//! ```text
//! Depot = (0,"Thais",1000)
//! Mark  = ("Thais",[32369,32215,7])
//! ```

use crate::error::{Error, Result};
use crate::types::{Position, Town};
use crate::utils::ByteString;
use std::collections::BTreeMap;
use std::path::Path;

/// Temple positions by town name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Temples(BTreeMap<String, Position>);

impl Temples {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = read_text(path.as_ref())?;
        Ok(Self::parse_moveuse(&text))
    }

    /// Collect the `SetStart` targets of the `Hometeleporters` section
    ///
    /// ```text
    /// BEGIN "Hometeleporters"
    /// Use, IsType(Obj1,2129) -> SetStart(Obj2,[32369,32241,07]), Text(Obj2,"Home Thais (1)")
    /// END
    /// ```
    ///
    /// A label ending in `(1)` wins over one ending in `(?)`.
    pub fn parse_moveuse(text: &str) -> Self {
        let mut temples = Self::default();
        let mut confirmed = BTreeMap::new();

        let mut lines = text.lines().map(str::trim);
        if !lines.any(|line| line == r#"BEGIN "Hometeleporters""#) {
            return temples;
        }
        for line in lines {
            if line.starts_with("BEGIN ") || line == "END" {
                break;
            }
            let Some((name, position, is_confirmed)) = parse_teleporter(line) else {
                continue;
            };
            if !confirmed.get(&name).copied().unwrap_or(false) || is_confirmed {
                temples.insert(&name, position);
                confirmed.insert(name, is_confirmed);
            }
        }
        temples
    }

    pub fn insert(&mut self, name: &str, position: Position) {
        self.0.insert(name.to_string(), position);
    }

    /// Temple of `name`, also matching names written without spaces
    pub fn get(&self, name: &str) -> Option<Position> {
        let compact = |s: &str| s.replace(' ', "");
        self.0.get(name).copied().or_else(|| {
            let wanted = compact(name);
            self.0
                .iter()
                .find(|(known, _)| compact(known) == wanted)
                .map(|(_, &position)| position)
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_teleporter(line: &str) -> Option<(String, Position, bool)> {
    const TARGET: &str = "SetStart(Obj2,[";
    const LABEL: &str = "\"Home ";

    let start = line.find(TARGET)? + TARGET.len();
    let end = start + line[start..].find(']')?;
    let position = parse_position(&line[start..end])?;

    let label = &line[line.find(LABEL)? + LABEL.len()..];
    let (name, is_confirmed) = if let Some(index) = label.find(" (1)\"") {
        (&label[..index], true)
    } else {
        (&label[..label.find(" (?)\"")?], false)
    };
    Some((name.to_string(), position, is_confirmed))
}

/// Read the towns of `map.dat`, placing temples from `temples` first
///
/// Town ids are the depot numbers plus one. Depots without any known temple
/// are left out.
pub fn parse_map_dat(text: &str, temples: &Temples) -> Result<Vec<Town>> {
    let mut depots = Vec::new();
    let mut marks = Temples::default();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let malformed = |what: &str| Error::SpecSource {
            line: index + 1,
            reason: format!("malformed {what}: {value}"),
        };

        match key.trim() {
            "Depot" => {
                let inner = value.trim().trim_start_matches('(').trim_end_matches(')');
                let mut parts = inner.splitn(3, ',').map(str::trim);
                let depot = parts
                    .next()
                    .and_then(|id| id.parse::<u32>().ok())
                    .ok_or_else(|| malformed("depot"))?;
                let name = parts
                    .next()
                    .map(|name| name.trim_matches('"'))
                    .ok_or_else(|| malformed("depot"))?;
                depots.push((depot, name.to_string()));
            }
            "Mark" => {
                let (name, position) = parse_mark(value).ok_or_else(|| malformed("mark"))?;
                marks.insert(name, position);
            }
            _ => {}
        }
    }

    let mut towns = Vec::with_capacity(depots.len());
    for (depot, name) in depots {
        let Some(temple) = temples.get(&name).or_else(|| marks.get(&name)) else {
            log::warn!("town {name:?} has no temple position, leaving it out");
            continue;
        };
        let id = depot.checked_add(1).ok_or(Error::OutOfRange {
            what: "depot id",
            value: depot as i64,
        })?;
        towns.push(Town::new(id, ByteString::from_cp1252(&name), temple));
    }

    log::debug!("parsed {} towns", towns.len());
    Ok(towns)
}

/// Towns from the game's `map.dat` and, if given, `moveuse.dat`
pub fn load(map_dat: impl AsRef<Path>, moveuse: Option<&Path>) -> Result<Vec<Town>> {
    let temples = match moveuse {
        Some(path) => Temples::from_path(path)?,
        None => Temples::default(),
    };
    let map_dat = map_dat.as_ref();
    let text = read_text(map_dat)?;
    parse_map_dat(&text, &temples).map_err(|err| err.in_file(map_dat))
}

fn parse_mark(value: &str) -> Option<(&str, Position)> {
    let value = value.trim();
    let name_start = value.find('"')? + 1;
    let name_end = name_start + value[name_start..].find('"')?;
    let open = value.find('[')? + 1;
    let close = open + value[open..].find(']')?;
    Some((&value[name_start..name_end], parse_position(&value[open..close])?))
}

/// `x,y,z` with optional leading zeros
fn parse_position(text: &str) -> Option<Position> {
    let mut parts = text.split(',').map(str::trim);
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    parts.next().is_none().then(|| Position::new(x, y, z))
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|err| Error::from(err).in_file(path))?;
    Ok(ByteString::new(bytes).decode().into_owned())
}
