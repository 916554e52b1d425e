//! cellpatch-core: load a tabular file, patch cells, save it again
//!
//! Three formats share one model:
//! - delimited text (`.csv`), every cell text
//! - JSON documents whose top-level array holds the rows
//! - Python pickle streams of plain data (lists, tuples, dicts, scalars)
//!
//! A [`TabularFile`] picks its [`FormatCodec`] from the source suffix, reads the
//! source into a [`Table`], applies `"col,row,value"` changes one by one, and
//! writes the result with the same codec.
pub mod change;
pub mod codec;
pub mod delimited;
pub mod edit;
pub mod error;
pub mod json;
pub mod listing;
pub mod model;
pub mod pickle;
pub mod pickle_write;

pub use change::Change;
pub use codec::{CodecOptions, Format, FormatCodec, TabularFile, codec_for};
pub use delimited::{CsvCodec, CsvOpts, LineTerminator};
pub use edit::{ChangeOutcome, EditReport, apply_changes};
pub use error::{Axis, ChangeError, CodecError};
pub use json::{JsonCodec, JsonOpts};
pub use listing::{containing_dir, list_entries};
pub use model::{Cell, Outer, Table};
pub use pickle::PickleCodec;
pub use pickle_write::{PickleOpts, write_pickle};
