use crate::error::{Error, Result};
use crate::types::TypeId;
use crate::utils::ByteString;
use std::collections::BTreeMap;
use std::path::Path;

/// Flag marking ground objects
pub const GROUND_FLAG: &str = "Bank";

/// One object definition from the specification source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSpec {
    pub type_id: TypeId,
    pub name: String,
    pub flags: Vec<String>,
}

impl ObjectSpec {
    pub fn new(type_id: TypeId, name: impl Into<String>) -> Self {
        Self {
            type_id,
            name: name.into(),
            flags: Vec::new(),
        }
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// Parsed object specification source (`objects.srv`)
///
/// ```text
/// TypeID      = 100    # comment
/// Name        = "grass"
/// Flags       = {Bank, Unmove}
/// ```
///
/// Keys other than `TypeID`, `Name` and `Flags` are ignored. A `Flags` list
/// may continue over several lines until its closing brace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSpecs {
    specs: Vec<ObjectSpec>,
    by_id: BTreeMap<TypeId, usize>,
}

impl ObjectSpecs {
    pub fn new(specs: Vec<ObjectSpec>) -> Self {
        let by_id = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| (spec.type_id, index))
            .collect();
        Self { specs, by_id }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| Error::from(err).in_file(path))?;
        Self::from_bytes(&bytes).map_err(|err| err.in_file(path))
    }

    /// Decode as UTF-8, falling back to Windows-1252, then parse
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = ByteString::new(bytes.to_vec());
        Self::parse(&text.decode())
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut specs = Vec::new();
        let mut current: Option<ObjectSpec> = None;
        let mut pending_flags: Option<String> = None;

        for (index, raw_line) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = strip_comment(raw_line).trim();

            if let Some(flags) = &mut pending_flags {
                flags.push(' ');
                flags.push_str(line);
                if line.contains('}') {
                    if let (Some(spec), Some(flags)) = (&mut current, pending_flags.take()) {
                        spec.flags = parse_flags(&flags);
                    }
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "TypeID" => {
                    let type_id = value.parse::<u32>().map_err(|err| Error::SpecSource {
                        line: line_number,
                        reason: format!("invalid TypeID {value:?}: {err}"),
                    })?;
                    specs.extend(current.replace(ObjectSpec::new(TypeId(type_id), "")));
                }
                "Name" => {
                    if let Some(spec) = &mut current {
                        spec.name = value.trim_matches('"').to_string();
                    }
                }
                "Flags" if current.is_some() => {
                    if value.contains('}') {
                        if let Some(spec) = &mut current {
                            spec.flags = parse_flags(value);
                        }
                    } else {
                        pending_flags = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }

        if pending_flags.is_some() {
            return Err(Error::SpecSource {
                line: text.lines().count(),
                reason: "unterminated Flags list".to_string(),
            });
        }
        specs.extend(current);

        log::debug!("parsed {} object specifications", specs.len());
        Ok(Self::new(specs))
    }

    /// Definitions in source order
    pub fn specs(&self) -> &[ObjectSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Last definition of `type_id`
    pub fn get(&self, type_id: TypeId) -> Option<&ObjectSpec> {
        self.by_id.get(&type_id).map(|&index| &self.specs[index])
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.by_id.contains_key(&type_id)
    }

    pub fn is_ground(&self, type_id: TypeId) -> bool {
        self.get(type_id).is_some_and(|spec| spec.has_flag(GROUND_FLAG))
    }
}

/// Cut a `#` comment, ignoring `#` inside quotes
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (index, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_flags(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(str::trim)
        .filter(|flag| !flag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_matches, assert_ok};

    const SOURCE: &str = r#"# objects.srv
TypeID      = 100 # grass
Name        = "grass"
Flags       = {Bank, Unmove}
Attributes  = {Waypoints=150}

TypeID      = 205
Name        = "a wooden chair # with a hash"
Flags       = {Unmove,
               Avoid, Height}

TypeID      = 2853
Name        = "a bag"
Flags       = {Container, Take}
"#;

    #[test]
    fn parses_blocks() {
        let specs = assert_ok!(ObjectSpecs::parse(SOURCE));
        insta::assert_debug_snapshot!(specs.specs(), @r#"
        [
            ObjectSpec {
                type_id: TypeId(
                    100,
                ),
                name: "grass",
                flags: [
                    "Bank",
                    "Unmove",
                ],
            },
            ObjectSpec {
                type_id: TypeId(
                    205,
                ),
                name: "a wooden chair # with a hash",
                flags: [
                    "Unmove",
                    "Avoid",
                    "Height",
                ],
            },
            ObjectSpec {
                type_id: TypeId(
                    2853,
                ),
                name: "a bag",
                flags: [
                    "Container",
                    "Take",
                ],
            },
        ]
        "#);
    }

    #[test]
    fn lookups() {
        let specs = assert_ok!(ObjectSpecs::parse(SOURCE));
        assert!(specs.contains(TypeId(205)));
        assert!(!specs.contains(TypeId(99999)));
        assert!(specs.is_ground(TypeId(100)));
        assert!(!specs.is_ground(TypeId(2853)));
        assert!(!specs.is_ground(TypeId(99999)));
    }

    #[test]
    fn rejects_malformed_type_id() {
        let err = ObjectSpecs::parse("TypeID = 100\nName = \"x\"\nTypeID = abc\n").unwrap_err();
        assert_matches!(err, Error::SpecSource { line: 3, .. });
    }

    #[test]
    fn rejects_unterminated_flags() {
        assert_matches!(
            ObjectSpecs::parse("TypeID = 1\nFlags = {Bank,\nUnmove\n"),
            Err(Error::SpecSource { .. })
        );
    }

    #[test]
    fn decodes_windows_1252() {
        let bytes = b"TypeID = 7\nName = \"caf\xE9\"\n";
        let specs = assert_ok!(ObjectSpecs::from_bytes(bytes));
        assert_eq!(specs.specs()[0].name, "café");
    }
}
