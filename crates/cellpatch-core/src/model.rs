use std::fmt::{self, Write as _};

use crate::error::ChangeError;

/// One value in a table. Structured formats may carry any of these; delimited
/// text only ever produces `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    // only for integers above i64::MAX
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Cell>),
    Tuple(Vec<Cell>),
    // insertion ordered
    Map(Vec<(Cell, Cell)>),
    Set(Vec<Cell>),
    FrozenSet(Vec<Cell>),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Elements of a list or tuple; `None` for every other kind.
    pub fn as_seq(&self) -> Option<&[Cell]> {
        match self {
            Cell::List(items) | Cell::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::Int(_) | Cell::UInt(_) => "int",
            Cell::Float(_) => "float",
            Cell::Text(_) => "text",
            Cell::Bytes(_) => "bytes",
            Cell::List(_) => "list",
            Cell::Tuple(_) => "tuple",
            Cell::Map(_) => "map",
            Cell::Set(_) => "set",
            Cell::FrozenSet(_) => "frozenset",
        }
    }

    fn fmt_nested(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => write!(out, "{:?}", s),
            other => write!(out, "{}", other),
        }
    }
}

fn fmt_items(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: &[Cell],
    close: &str,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, it) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        it.fmt_nested(f)?;
    }
    f.write_str(close)
}

/// Text is rendered raw; scalars in JSON notation; containers bracketed with
/// nested text quoted.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("null"),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(x) => write!(f, "{}", x),
            Cell::UInt(x) => write!(f, "{}", x),
            Cell::Float(x) => write!(f, "{:?}", x),
            Cell::Text(s) => f.write_str(s),
            Cell::Bytes(b) => write!(f, "<bytes {}>", b.len()),
            Cell::List(items) => fmt_items(f, "[", items, "]"),
            Cell::Tuple(items) => fmt_items(f, "(", items, ")"),
            Cell::Set(items) | Cell::FrozenSet(items) => fmt_items(f, "{", items, "}"),
            Cell::Map(pairs) => {
                f.write_char('{')?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    k.fmt_nested(f)?;
                    f.write_str(": ")?;
                    v.fmt_nested(f)?;
                }
                f.write_char('}')
            }
        }
    }
}

/// Kind of the outer container the rows were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outer {
    #[default]
    List,
    Tuple,
}

/// Rows of cells: the shape every codec decodes into and encodes from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    rows: Vec<Cell>,
    outer: Outer,
}

impl Table {
    pub fn new(rows: Vec<Cell>) -> Self {
        Self {
            rows,
            outer: Outer::List,
        }
    }

    /// Build a table from rows of plain text, as delimited text produces.
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            rows.into_iter()
                .map(|row| Cell::List(row.into_iter().map(|s| Cell::Text(s.into())).collect()))
                .collect(),
        )
    }

    /// Accept a decoded document only if its top level is a sequence.
    pub fn from_root(root: Cell) -> Result<Self, String> {
        match root {
            Cell::List(rows) => Ok(Self {
                rows,
                outer: Outer::List,
            }),
            Cell::Tuple(rows) => Ok(Self {
                rows,
                outer: Outer::Tuple,
            }),
            other => Err(format!(
                "top-level value is not a sequence of rows (found {})",
                other.kind()
            )),
        }
    }

    pub fn to_root(&self) -> Cell {
        match self.outer {
            Outer::List => Cell::List(self.rows.clone()),
            Outer::Tuple => Cell::Tuple(self.rows.clone()),
        }
    }

    pub fn outer(&self) -> Outer {
        self.outer
    }
    pub fn rows(&self) -> &[Cell] {
        &self.rows
    }
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row)?.as_seq()?.get(col)
    }

    /// Overwrite one cell. The row is checked before the column. Tuple rows
    /// are read-only.
    pub fn set_cell(&mut self, row: i64, col: i64, value: Cell) -> Result<(), ChangeError> {
        let r = usize::try_from(row)
            .ok()
            .filter(|r| *r < self.rows.len())
            .ok_or(ChangeError::RowOutOfRange(row))?;
        let cells = match &mut self.rows[r] {
            Cell::List(cells) => cells,
            Cell::Tuple(_) => return Err(ChangeError::ImmutableRow(row)),
            _ => return Err(ChangeError::NotASequence(row)),
        };
        let c = usize::try_from(col)
            .ok()
            .filter(|c| *c < cells.len())
            .ok_or(ChangeError::ColumnOutOfRange(col))?;
        cells[c] = value;
        Ok(())
    }

    /// One line per row, cells joined with `,`.
    pub fn render_lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| match row.as_seq() {
                Some(cells) => {
                    let mut line = String::new();
                    for (i, c) in cells.iter().enumerate() {
                        if i > 0 {
                            line.push(',');
                        }
                        write!(line, "{}", c).ok();
                    }
                    line
                }
                None => row.to_string(),
            })
            .collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.render_lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Table {
        Table::from_text_rows([["a", "b"], ["c", "d"]])
    }

    #[test]
    fn render_joins_cells_with_commas() {
        let t = Table::new(vec![
            Cell::List(vec![Cell::text("x"), Cell::Int(3), Cell::Float(1.0), Cell::Null]),
            Cell::List(vec![Cell::Bool(true), Cell::List(vec![Cell::text("n"), Cell::Int(1)])]),
            Cell::Int(7),
        ]);
        assert_eq!(
            t.render_lines(),
            vec!["x,3,1.0,null", "true,[\"n\", 1]", "7"]
        );
        assert_eq!(t.to_string(), "x,3,1.0,null\ntrue,[\"n\", 1]\n7\n");
    }

    #[test]
    fn set_cell_checks_row_then_column() {
        let mut t = grid();
        assert_eq!(
            t.set_cell(5, 9, Cell::text("X")),
            Err(ChangeError::RowOutOfRange(5))
        );
        assert_eq!(
            t.set_cell(0, 2, Cell::text("X")),
            Err(ChangeError::ColumnOutOfRange(2))
        );
        assert_eq!(
            t.set_cell(-1, 0, Cell::text("X")),
            Err(ChangeError::RowOutOfRange(-1))
        );
        assert_eq!(t, grid());
        t.set_cell(1, 0, Cell::text("Z")).unwrap();
        assert_eq!(t.cell(1, 0), Some(&Cell::text("Z")));
    }

    #[test]
    fn non_sequence_row_cannot_be_indexed() {
        let mut t = Table::new(vec![Cell::text("flat")]);
        assert_eq!(
            t.set_cell(0, 0, Cell::text("X")),
            Err(ChangeError::NotASequence(0))
        );
    }

    #[test]
    fn tuple_rows_are_read_only() {
        let row = Cell::Tuple(vec![Cell::Int(1), Cell::Int(2)]);
        let mut t = Table::new(vec![row.clone(), Cell::List(vec![Cell::Int(3)])]);
        assert_eq!(
            t.set_cell(0, 0, Cell::text("X")),
            Err(ChangeError::ImmutableRow(0))
        );
        assert_eq!(
            t.set_cell(0, 9, Cell::text("X")),
            Err(ChangeError::ImmutableRow(0))
        );
        assert_eq!(t.rows()[0], row);
        t.set_cell(1, 0, Cell::text("Y")).unwrap();
        assert_eq!(t.cell(1, 0), Some(&Cell::text("Y")));
    }

    #[test]
    fn from_root_keeps_tuple_outer() {
        let t = Table::from_root(Cell::Tuple(vec![Cell::List(vec![])])).unwrap();
        assert_eq!(t.outer(), Outer::Tuple);
        assert_eq!(t.to_root(), Cell::Tuple(vec![Cell::List(vec![])]));
        let err = Table::from_root(Cell::Map(vec![])).unwrap_err();
        assert!(err.contains("found map"));
    }
}
