//! Generic nested node tree used by the map editor's file formats
//!
//! A file starts with a four byte identifier followed by a single root node:
//!
//! ```text
//! node := 0xFE kind props child* 0xFF
//! ```
//!
//! The props run until the next unescaped marker. Any `0xFD`, `0xFE` or `0xFF`
//! inside the kind or props is preceded by the escape byte `0xFD`.

mod node;
pub mod projection;
mod props;

pub use self::node::{Node, decode, encode};
pub use self::projection::{project, unproject};
pub use self::props::PropReader;

use crate::error::{Error, Result};

/// Escape byte
pub const ESCAPE: u8 = 0xFD;

/// Node start marker
pub const NODE_START: u8 = 0xFE;

/// Node end marker
pub const NODE_END: u8 = 0xFF;

/// Identifier written by the editor in front of map files
pub const MAP_IDENTIFIER: [u8; 4] = *b"OTBM";

/// Identifier written in front of item catalogs
pub const CATALOG_IDENTIFIER: [u8; 4] = [0; 4];

/// Maximum nesting of nodes below (and including) the root
pub const MAX_NODE_DEPTH: usize = 64;

fn is_marker(byte: u8) -> bool {
    matches!(byte, ESCAPE | NODE_START | NODE_END)
}

/// Escape every marker byte in `bytes`
pub fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(bytes.len());
    escape_into(&mut escaped, bytes);
    escaped
}

pub(crate) fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        if is_marker(byte) {
            out.push(ESCAPE);
        }
        out.push(byte);
    }
}

/// Reverse [`escape`]
///
/// Fails with `TruncatedInput` on a dangling escape byte and with a format
/// error on an unescaped node marker.
pub fn unescape(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut unescaped = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().enumerate();
    while let Some((offset, &byte)) = iter.next() {
        match byte {
            ESCAPE => match iter.next() {
                Some((_, &escaped)) => unescaped.push(escaped),
                None => {
                    return Err(Error::TruncatedInput {
                        offset: offset + 1,
                        context: "escaped byte",
                    });
                }
            },
            NODE_START | NODE_END => {
                return Err(Error::format(offset, "unescaped node marker"));
            }
            _ => unescaped.push(byte),
        }
    }
    Ok(unescaped)
}
