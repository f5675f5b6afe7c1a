use serde::{Deserialize, Serialize};
use std::fmt;

/// Object type identifier
///
/// The same number denotes the same object in the sector files, the tree map
/// and the item catalog. There is deliberately no translation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for TypeId {
    fn from(value: u16) -> Self {
        TypeId(value as u32)
    }
}

/// Opaque attribute record attached to an object
///
/// The tag is only used for framing. `data` is never decoded by this crate and
/// is written back exactly as it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub tag: u8,
    pub data: Vec<u8>,
}

impl Attribute {
    pub fn new(tag: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            data: data.into(),
        }
    }
}

/// A game object: type identifier, attribute records and container contents
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Object {
    pub type_id: TypeId,
    /// Attribute records in their original order
    pub attributes: Vec<Attribute>,
    /// Objects stored inside this one (containers)
    pub contents: Vec<Object>,
}

impl Object {
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            attributes: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// Append an attribute record. Returns `self` to allow chaining.
    pub fn with_attribute(mut self, tag: u8, data: impl Into<Vec<u8>>) -> Self {
        self.attributes.push(Attribute::new(tag, data));
        self
    }

    /// Append an object to the contents. Returns `self` to allow chaining.
    pub fn with_content(mut self, object: Object) -> Self {
        self.contents.push(object);
        self
    }

    /// Visit this object and all nested contents, parents first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Object)) {
        visit(self);
        for content in &self.contents {
            content.walk(visit);
        }
    }
}
