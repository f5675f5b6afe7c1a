use crate::types::Position;
use crate::utils::ByteString;

/// A town with the temple players respawn at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Town {
    pub id: u32,
    pub name: ByteString,
    pub temple: Position,
}

impl Town {
    pub fn new(id: u32, name: impl Into<ByteString>, temple: Position) -> Self {
        Self {
            id,
            name: name.into(),
            temple,
        }
    }
}
