use crate::types::{Position, TypeId};
use std::io;
use std::path::PathBuf;

/// Unrecoverable conversion errors
///
/// Decoding is never best-effort: any of these aborts the file (or catalog)
/// being processed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed input at byte {offset}: {reason}")]
    Format { offset: usize, reason: String },

    #[error("Unexpected end of input at byte {offset} while reading {context}")]
    TruncatedInput {
        offset: usize,
        context: &'static str,
    },

    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: i64 },

    #[error("{what} exceeds format limit of {limit} (found {actual})")]
    LimitExceeded {
        what: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error("Unknown type identifier {type_id} at {position}")]
    UnknownTypeId { type_id: TypeId, position: Position },

    #[error("Conflicting definitions for type identifier {0}")]
    DuplicateTypeId(TypeId),

    #[error("Unexpected node in {context}: expected type 0x{expected:02X}, found 0x{found:02X}")]
    UnexpectedNesting {
        context: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("Tile {0} is defined more than once")]
    DuplicateTile(Position),

    #[error("Line {line}: {reason}")]
    SpecSource { line: usize, reason: String },

    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn format(offset: usize, reason: impl Into<String>) -> Self {
        Error::Format {
            offset,
            reason: reason.into(),
        }
    }

    /// Attach the identity of the file being processed
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        Error::InFile {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Strip any file context and return the underlying error
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::InFile { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_context_is_displayed() {
        let err = Error::format(12, "bad magic").in_file("sectors/1000-1000-07.sec");
        insta::assert_snapshot!(
            err.to_string(),
            @"sectors/1000-1000-07.sec: Malformed input at byte 12: bad magic"
        );
    }

    #[test]
    fn root_cause_unwraps_nested_context() {
        let err = Error::DuplicateTypeId(TypeId(7))
            .in_file("a")
            .in_file("b");
        assert!(matches!(err.root_cause(), Error::DuplicateTypeId(TypeId(7))));
    }
}
