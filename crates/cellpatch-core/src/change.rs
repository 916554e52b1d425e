use std::str::FromStr;

use crate::error::{Axis, ChangeError};

/// One cell edit parsed from `"col,row,value"`.
///
/// Coordinates are kept signed; bounds are only known once a table is
/// loaded, so a negative index is reported by the edit applicator as out of
/// range just like one that is too large.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub col: i64,
    pub row: i64,
    pub value: String,
}

fn parse_index(axis: Axis, text: &str) -> Result<i64, ChangeError> {
    text.trim().parse().map_err(|source| ChangeError::Parse {
        axis,
        text: text.to_string(),
        source,
    })
}

impl FromStr for Change {
    type Err = ChangeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(',').collect();
        let [col, row, value] = parts[..] else {
            return Err(ChangeError::Format {
                raw: raw.to_string(),
            });
        };
        Ok(Change {
            col: parse_index(Axis::Column, col)?,
            row: parse_index(Axis::Row, row)?,
            value: value.to_string(),
        })
    }
}
