//! Format codec contract, suffix dispatch, and the per-run file handler.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::delimited::{CsvCodec, CsvOpts};
use crate::edit::{EditReport, apply_changes};
use crate::error::CodecError;
use crate::json::{JsonCodec, JsonOpts};
use crate::model::Table;
use crate::pickle::PickleCodec;
use crate::pickle_write::PickleOpts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
    Pickle,
}

/// Lower-case file suffixes and the format each selects.
const SUFFIXES: &[(&str, Format)] = &[
    ("csv", Format::Csv),
    ("json", Format::Json),
    ("pickle", Format::Pickle),
    ("pkl", Format::Pickle),
];

impl Format {
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(s, _)| *s == ext)
            .map(|(_, f)| *f)
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Csv => "CSV",
            Format::Json => "JSON",
            Format::Pickle => "Pickle",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Suffix including the dot, lower-cased, as shown in error messages.
pub fn suffix_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Reads bytes into a [`Table`] and writes a [`Table`] back to bytes.
///
/// Once a table is decoded, editing and display never depend on which codec
/// produced it.
pub trait FormatCodec {
    fn format(&self) -> Format;
    fn decode(&self, data: &[u8]) -> Result<Table, CodecError>;
    fn encode(&self, table: &Table) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    pub csv: CsvOpts,
    pub json: JsonOpts,
    pub pickle: PickleOpts,
}

pub fn codec_for(format: Format, opts: &CodecOptions) -> Box<dyn FormatCodec> {
    match format {
        Format::Csv => Box::new(CsvCodec::new(opts.csv)),
        Format::Json => Box::new(JsonCodec::new(opts.json)),
        Format::Pickle => Box::new(PickleCodec::new(opts.pickle)),
    }
}

/// One source/destination pair and the table loaded from the source.
pub struct TabularFile {
    src: PathBuf,
    dst: PathBuf,
    codec: Box<dyn FormatCodec>,
    table: Table,
}

impl TabularFile {
    /// Pick the codec from the source suffix. The destination is written with
    /// the same codec whatever its own suffix is.
    pub fn open(
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        opts: &CodecOptions,
    ) -> Result<Self, CodecError> {
        let src = src.into();
        let format =
            Format::from_path(&src).ok_or_else(|| CodecError::Unsupported(suffix_of(&src)))?;
        Ok(Self::with_codec(src, dst, codec_for(format, opts)))
    }

    pub fn with_codec(
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        codec: Box<dyn FormatCodec>,
    ) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            codec,
            table: Table::default(),
        }
    }

    pub fn format(&self) -> Format {
        self.codec.format()
    }
    pub fn dst(&self) -> &Path {
        &self.dst
    }
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn read(&mut self) -> Result<(), CodecError> {
        let data = fs::read(&self.src).map_err(|source| CodecError::Io {
            path: self.src.clone(),
            source,
        })?;
        self.table = self.codec.decode(&data)?;
        log::debug!(
            "read {} rows from {} ({} bytes, {})",
            self.table.row_count(),
            self.src.display(),
            data.len(),
            self.format()
        );
        Ok(())
    }

    pub fn apply_changes<S: AsRef<str>>(&mut self, changes: &[S]) -> EditReport {
        apply_changes(&mut self.table, changes)
    }

    pub fn display(&self) -> String {
        self.table.to_string()
    }

    pub fn write(&self) -> Result<(), CodecError> {
        let data = self.codec.encode(&self.table)?;
        fs::write(&self.dst, &data).map_err(|source| CodecError::Io {
            path: self.dst.clone(),
            source,
        })?;
        log::debug!("wrote {} bytes to {}", data.len(), self.dst.display());
        Ok(())
    }
}
