//! Delimited text codec

use crate::codec::{Format, FormatCodec};
use crate::error::CodecError;
use crate::model::{Cell, Table};

/// Line terminator written after each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    Lf,
    #[default]
    Crlf,
}

/// Options for reading and writing delimited text
#[derive(Debug, Clone, Copy)]
pub struct CsvOpts {
    /// Field delimiter (default: comma)
    pub delimiter: u8,
    /// Quote character (default: double quote)
    pub quote: u8,
    pub line_terminator: LineTerminator,
}

impl Default for CsvOpts {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            line_terminator: LineTerminator::Crlf,
        }
    }
}

/// Rows are records and cells are fields; every cell is text.
pub struct CsvCodec {
    opts: CsvOpts,
}

impl CsvCodec {
    pub fn new(opts: CsvOpts) -> Self {
        Self { opts }
    }
}

impl FormatCodec for CsvCodec {
    fn format(&self) -> Format {
        Format::Csv
    }

    fn decode(&self, data: &[u8]) -> Result<Table, CodecError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.opts.delimiter)
            .quote(self.opts.quote)
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        // The reader skips blank lines; each one still counts as an empty row.
        let mut rows = Vec::new();
        let mut record = csv::StringRecord::new();
        let mut end = 0usize;
        loop {
            let more = reader
                .read_record(&mut record)
                .map_err(|e| CodecError::decode(Format::Csv, e))?;
            let blanks = blank_lines_at(data, end);
            rows.extend(std::iter::repeat_with(|| Cell::List(Vec::new())).take(blanks));
            if !more {
                break;
            }
            rows.push(Cell::List(record.iter().map(Cell::text).collect()));
            end = usize::try_from(reader.position().byte()).unwrap_or(data.len());
        }
        Ok(Table::new(rows))
    }

    fn encode(&self, table: &Table) -> Result<Vec<u8>, CodecError> {
        let (terminator, line_end): (csv::Terminator, &[u8]) = match self.opts.line_terminator {
            LineTerminator::Lf => (csv::Terminator::Any(b'\n'), &b"\n"[..]),
            LineTerminator::Crlf => (csv::Terminator::CRLF, &b"\r\n"[..]),
        };
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.opts.delimiter)
            .quote(self.opts.quote)
            .terminator(terminator)
            .flexible(true);

        // The writer turns an empty record into `""`, so empty rows are
        // written as a bare line end between runs of records.
        let mut out = Vec::new();
        let mut index = 0;
        for (n, run) in table.rows().split(is_empty_row).enumerate() {
            if n > 0 {
                out.extend_from_slice(line_end);
                index += 1;
            }
            if run.is_empty() {
                continue;
            }
            let mut writer = builder.from_writer(&mut out);
            for row in run {
                let cells = row.as_seq().ok_or_else(|| {
                    CodecError::encode(
                        Format::Csv,
                        format!("row {} is a {}, not a record", index, row.kind()),
                    )
                })?;
                let record: Vec<String> = cells.iter().map(field_text).collect();
                writer
                    .write_record(&record)
                    .map_err(|e| CodecError::encode(Format::Csv, e))?;
                index += 1;
            }
            writer
                .flush()
                .map_err(|e| CodecError::encode(Format::Csv, e))?;
        }
        Ok(out)
    }
}

fn is_empty_row(row: &Cell) -> bool {
    row.as_seq().is_some_and(<[Cell]>::is_empty)
}

// Line ends starting at `from` that carry no record. A `\n` right after the
// `\r` that closed the previous record belongs to that record.
fn blank_lines_at(data: &[u8], from: usize) -> usize {
    let mut i = from;
    if i > 0 && data.get(i - 1) == Some(&b'\r') && data.get(i) == Some(&b'\n') {
        i += 1;
    }
    let mut count = 0;
    while let Some(&b) = data.get(i) {
        match b {
            b'\r' if data.get(i + 1) == Some(&b'\n') => i += 2,
            b'\r' | b'\n' => i += 1,
            _ => break,
        }
        count += 1;
    }
    count
}

// Null is an empty field; everything else uses its display text.
fn field_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codec() -> CsvCodec {
        CsvCodec::new(CsvOpts::default())
    }

    #[test]
    fn decodes_every_field_as_text() {
        let t = codec().decode(b"a,1,true\r\nc,,\"x,y\"\n").unwrap();
        assert_eq!(
            t,
            Table::from_text_rows([["a", "1", "true"], ["c", "", "x,y"]])
        );
    }

    #[test]
    fn ragged_rows_are_kept() {
        let t = codec().decode(b"a\nb,c,d\n").unwrap();
        assert_eq!(t.rows()[0].as_seq().unwrap().len(), 1);
        assert_eq!(t.rows()[1].as_seq().unwrap().len(), 3);
    }

    #[test]
    fn quotes_fields_that_need_it() {
        let t = Table::from_text_rows([vec!["plain", "has,comma", "two\nlines", "say \"hi\""]]);
        let out = codec().encode(&t).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "plain,\"has,comma\",\"two\nlines\",\"say \"\"hi\"\"\"\r\n"
        );
    }

    #[test]
    fn lf_terminator_and_custom_delimiter() {
        let opts = CsvOpts {
            delimiter: b';',
            line_terminator: LineTerminator::Lf,
            ..CsvOpts::default()
        };
        let c = CsvCodec::new(opts);
        let t = c.decode(b"a;b\nc;d\n").unwrap();
        assert_eq!(t, Table::from_text_rows([["a", "b"], ["c", "d"]]));
        assert_eq!(c.encode(&t).unwrap(), b"a;b\nc;d\n");
    }

    #[test]
    fn non_utf8_input_is_a_decode_error() {
        let err = codec().decode(b"ok\n\xff\xfe\n").unwrap_err();
        assert!(matches!(err, CodecError::Decode { format: Format::Csv, .. }));
    }

    #[test]
    fn blank_lines_are_empty_rows() {
        let t = codec().decode(b"a,b\n\nc,d\n").unwrap();
        assert_eq!(
            t.rows(),
            &[
                Cell::List(vec![Cell::text("a"), Cell::text("b")]),
                Cell::List(vec![]),
                Cell::List(vec![Cell::text("c"), Cell::text("d")]),
            ]
        );

        let t = codec().decode(b"\r\nx\r\n\r\n\r\ny\r\n\n").unwrap();
        let lens: Vec<usize> = t.rows().iter().map(|r| r.as_seq().unwrap().len()).collect();
        assert_eq!(lens, vec![0, 1, 0, 0, 1, 0]);

        // a quoted line break is field content, not a blank line
        let t = codec().decode(b"\"p\n\nq\"\nz\n").unwrap();
        assert_eq!(t, Table::from_text_rows([["p\n\nq"], ["z"]]));
    }

    #[test]
    fn edit_after_blank_line_hits_the_right_row() {
        let mut t = codec().decode(b"a,b\n\nc,d\n").unwrap();
        let report = crate::edit::apply_changes(&mut t, &["0,2,Z"]);
        assert_eq!(report.skipped_count(), 0);
        assert_eq!(t.cell(2, 0), Some(&Cell::text("Z")));
    }

    #[test]
    fn empty_rows_are_written_as_bare_line_ends() {
        let t = Table::new(vec![
            Cell::List(vec![]),
            Cell::List(vec![Cell::text("x")]),
            Cell::List(vec![]),
            Cell::List(vec![]),
            Cell::List(vec![Cell::text("y"), Cell::Null]),
        ]);
        let out = codec().encode(&t).unwrap();
        assert_eq!(String::from_utf8(out.clone()).unwrap(), "\r\nx\r\n\r\n\r\ny,\r\n");
        assert_eq!(codec().decode(&out).unwrap().row_count(), 5);

        let lf = CsvCodec::new(CsvOpts {
            line_terminator: LineTerminator::Lf,
            ..CsvOpts::default()
        });
        assert_eq!(lf.encode(&Table::new(vec![Cell::List(vec![])])).unwrap(), b"\n");
    }

    #[test]
    fn flat_row_cannot_be_written() {
        let t = Table::new(vec![Cell::text("flat")]);
        assert!(matches!(
            codec().encode(&t),
            Err(CodecError::Encode { .. })
        ));
    }
}
