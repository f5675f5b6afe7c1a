use crate::error::{Error, Result};
use crate::utils::io::{read_bytes, read_u8, read_u16_le, read_u32_le, write_u16_le};
use std::io::Cursor;

/// Little-endian reader over the unescaped props of a node
pub struct PropReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PropReader<'a> {
    pub fn new(props: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(props),
        }
    }

    pub fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.offset() >= self.cursor.get_ref().len()
    }

    pub fn u8(&mut self, context: &'static str) -> Result<u8> {
        let offset = self.offset();
        read_u8(&mut self.cursor).map_err(|_| Error::TruncatedInput { offset, context })
    }

    pub fn u16(&mut self, context: &'static str) -> Result<u16> {
        let offset = self.offset();
        read_u16_le(&mut self.cursor).map_err(|_| Error::TruncatedInput { offset, context })
    }

    pub fn u32(&mut self, context: &'static str) -> Result<u32> {
        let offset = self.offset();
        read_u32_le(&mut self.cursor).map_err(|_| Error::TruncatedInput { offset, context })
    }

    /// A `u16` length followed by that many bytes
    pub fn string(&mut self, context: &'static str) -> Result<Vec<u8>> {
        let len = self.u16(context)?;
        let offset = self.offset();
        read_bytes(&mut self.cursor, len as usize).map_err(|_| Error::TruncatedInput { offset, context })
    }

    pub fn bytes(&mut self, len: usize, context: &'static str) -> Result<&'a [u8]> {
        let offset = self.offset();
        let remaining = self.remaining();
        if remaining.len() < len {
            return Err(Error::TruncatedInput { offset, context });
        }
        self.cursor.set_position((offset + len) as u64);
        Ok(&remaining[..len])
    }

    /// Bytes not consumed yet, without consuming them
    pub fn remaining(&self) -> &'a [u8] {
        let props: &'a [u8] = *self.cursor.get_ref();
        &props[self.offset().min(props.len())..]
    }

    /// Everything not consumed yet
    pub fn rest(&mut self) -> &'a [u8] {
        let props: &'a [u8] = *self.cursor.get_ref();
        let offset = self.offset().min(props.len());
        self.cursor.set_position(props.len() as u64);
        &props[offset..]
    }
}

/// Append a `u16` length prefixed string
pub(crate) fn write_string(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::LimitExceeded {
        what: "string length",
        limit: u16::MAX as usize,
        actual: bytes.len(),
    })?;
    write_u16_le(out, len)?;
    out.extend_from_slice(bytes);
    Ok(())
}
