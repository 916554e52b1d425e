//! Error types for codecs and cell edits

use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

use crate::codec::Format;

/// Errors that abort a run: reading, decoding, encoding or writing a file
#[derive(Debug, Error)]
pub enum CodecError {
    /// Filesystem failure on the source or destination
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content does not conform to the expected format
    #[error("cannot decode {format} content: {message}")]
    Decode { format: Format, message: String },

    /// A value has no representation in the target format
    #[error("cannot encode as {format}: {message}")]
    Encode { format: Format, message: String },

    /// No codec is registered for the file suffix
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
}

impl CodecError {
    pub fn decode(format: Format, message: impl fmt::Display) -> Self {
        CodecError::Decode {
            format,
            message: message.to_string(),
        }
    }

    pub fn encode(format: Format, message: impl fmt::Display) -> Self {
        CodecError::Encode {
            format,
            message: message.to_string(),
        }
    }
}

/// Which coordinate of a change failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Column,
    Row,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Column => f.write_str("column"),
            Axis::Row => f.write_str("row"),
        }
    }
}

/// Per-change failures. These are reported and skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeError {
    #[error("Invalid format: {raw}. Expected 'col,row,value'.")]
    Format { raw: String },

    #[error("invalid {axis} index '{text}': {source}")]
    Parse {
        axis: Axis,
        text: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Row {0} out of range.")]
    RowOutOfRange(i64),

    #[error("Column {0} out of range.")]
    ColumnOutOfRange(i64),

    #[error("Row {0} is not a sequence of cells.")]
    NotASequence(i64),

    #[error("Row {0} is a tuple and cannot be modified.")]
    ImmutableRow(i64),
}
