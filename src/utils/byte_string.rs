use std::borrow::Cow;
use std::fmt;

/// Wrapper around `Vec<u8>` for human-visible text stored as raw bytes
///
/// Map descriptions and item names travel through both formats as bytes. The
/// game data is Windows-1252 (Latin-1) encoded, but newer files may be UTF-8,
/// so the bytes are kept verbatim and only decoded for display.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteString(Vec<u8>);

impl ByteString {
    /// Create a new `ByteString` from a byte vector
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encode text as Windows-1252, the encoding the map editor expects
    ///
    /// Characters without a Windows-1252 representation are replaced by
    /// numeric character references, as done by `encoding_rs`.
    pub fn from_cp1252(text: &str) -> Self {
        let (encoded, _encoding, _had_errors) = encoding_rs::WINDOWS_1252.encode(text);
        Self(encoded.into_owned())
    }

    /// Get a reference to the underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert into the underlying byte vector
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode raw bytes to string
    ///
    /// Attempts UTF-8 decoding first, falling back to Windows-1252 (CP1252).
    /// Always succeeds.
    pub fn decode(&self) -> Cow<'_, str> {
        match std::str::from_utf8(&self.0) {
            Ok(s) => s.into(),
            Err(_) => encoding_rs::WINDOWS_1252.decode(&self.0).0,
        }
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for ByteString {
    fn from(str: &str) -> Self {
        Self(str.as_bytes().to_vec())
    }
}

impl From<String> for ByteString {
    fn from(str: String) -> Self {
        Self(str.into_bytes())
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => {
                // Show as hex if not valid UTF-8
                write!(f, "b\"")?;
                for &byte in &self.0 {
                    if byte.is_ascii_graphic() || byte == b' ' {
                        write!(f, "{}", byte as char)?;
                    } else {
                        write!(f, "\\x{:02x}", byte)?;
                    }
                }
                write!(f, "\"")
            }
        }
    }
}
