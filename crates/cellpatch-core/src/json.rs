use serde::Serialize;
use serde_json::Value as J;
use serde_json::ser::PrettyFormatter;

use crate::codec::{Format, FormatCodec};
use crate::error::CodecError;
use crate::model::{Cell, Table};

#[derive(Debug, Clone, Copy)]
pub struct JsonOpts {
    pub indent: usize,
}

impl Default for JsonOpts {
    fn default() -> Self {
        Self { indent: 4 }
    }
}

/// A JSON document whose top-level array holds the rows.
pub struct JsonCodec {
    opts: JsonOpts,
}

impl JsonCodec {
    pub fn new(opts: JsonOpts) -> Self {
        Self { opts }
    }
}

pub fn json_to_cell(v: &J) -> Cell {
    match v {
        J::Null => Cell::Null,
        J::Bool(b) => Cell::Bool(*b),
        J::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Cell::Int(i),
            (None, Some(u)) => Cell::UInt(u),
            (None, None) => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        J::String(s) => Cell::Text(s.clone()),
        J::Array(items) => Cell::List(items.iter().map(json_to_cell).collect()),
        J::Object(map) => Cell::Map(
            map.iter()
                .map(|(k, v)| (Cell::Text(k.clone()), json_to_cell(v)))
                .collect(),
        ),
    }
}

// Scalar keys are stringified the way JSON writers usually coerce them.
fn key_text(k: &Cell) -> Result<String, String> {
    match k {
        Cell::Text(s) => Ok(s.clone()),
        Cell::Null | Cell::Bool(_) | Cell::Int(_) | Cell::UInt(_) | Cell::Float(_) => {
            Ok(k.to_string())
        }
        other => Err(format!("{} cannot be an object key", other.kind())),
    }
}

pub fn cell_to_json(c: &Cell) -> Result<J, String> {
    Ok(match c {
        Cell::Null => J::Null,
        Cell::Bool(b) => J::Bool(*b),
        Cell::Int(i) => J::Number((*i).into()),
        Cell::UInt(u) => J::Number((*u).into()),
        Cell::Float(f) => serde_json::Number::from_f64(*f)
            .map(J::Number)
            .ok_or_else(|| format!("float {} has no JSON representation", f))?,
        Cell::Text(s) => J::String(s.clone()),
        Cell::List(items) | Cell::Tuple(items) => {
            J::Array(items.iter().map(cell_to_json).collect::<Result<_, _>>()?)
        }
        Cell::Map(pairs) => {
            let mut map = serde_json::Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                map.insert(key_text(k)?, cell_to_json(v)?);
            }
            J::Object(map)
        }
        Cell::Bytes(_) | Cell::Set(_) | Cell::FrozenSet(_) => {
            return Err(format!("{} values have no JSON representation", c.kind()));
        }
    })
}

impl FormatCodec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn decode(&self, data: &[u8]) -> Result<Table, CodecError> {
        let doc: J =
            serde_json::from_slice(data).map_err(|e| CodecError::decode(Format::Json, e))?;
        Table::from_root(json_to_cell(&doc)).map_err(|e| CodecError::decode(Format::Json, e))
    }

    fn encode(&self, table: &Table) -> Result<Vec<u8>, CodecError> {
        let doc = cell_to_json(&table.to_root()).map_err(|e| CodecError::encode(Format::Json, e))?;
        let indent = " ".repeat(self.opts.indent);
        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(
            &mut out,
            PrettyFormatter::with_indent(indent.as_bytes()),
        );
        doc.serialize(&mut ser)
            .map_err(|e| CodecError::encode(Format::Json, e))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codec() -> JsonCodec {
        JsonCodec::new(JsonOpts::default())
    }

    #[test]
    fn pretty_prints_with_four_spaces() {
        let t = Table::from_text_rows([["a", "b"], ["Z", "d"]]);
        let out = String::from_utf8(codec().encode(&t).unwrap()).unwrap();
        assert_eq!(
            out,
            "[\n    [\n        \"a\",\n        \"b\"\n    ],\n    [\n        \"Z\",\n        \"d\"\n    ]\n]"
        );
    }

    #[test]
    fn heterogeneous_cells_survive_a_pass() {
        let src = r#"[[1, 2.5, true, null, "s", {"z": 1, "a": [2]}], []]"#;
        let t = codec().decode(src.as_bytes()).unwrap();
        assert_eq!(
            t.rows()[0],
            Cell::List(vec![
                Cell::Int(1),
                Cell::Float(2.5),
                Cell::Bool(true),
                Cell::Null,
                Cell::text("s"),
                Cell::Map(vec![
                    (Cell::text("z"), Cell::Int(1)),
                    (Cell::text("a"), Cell::List(vec![Cell::Int(2)])),
                ]),
            ])
        );
        let again = codec().decode(&codec().encode(&t).unwrap()).unwrap();
        assert_eq!(again, t);
    }

    #[test]
    fn integers_beyond_i64_stay_exact() {
        let src = "[[18446744073709551615, 9223372036854775808, -9223372036854775808]]";
        let t = codec().decode(src.as_bytes()).unwrap();
        assert_eq!(
            t.rows()[0],
            Cell::List(vec![
                Cell::UInt(u64::MAX),
                Cell::UInt(1 << 63),
                Cell::Int(i64::MIN),
            ])
        );
        let out = String::from_utf8(codec().encode(&t).unwrap()).unwrap();
        assert!(out.contains("18446744073709551615,"), "{}", out);
        assert_eq!(codec().decode(out.as_bytes()).unwrap(), t);
        assert_eq!(t.to_string(), "18446744073709551615,9223372036854775808,-9223372036854775808\n");
    }

    #[test]
    fn object_keys_keep_document_order() {
        let t = codec().decode(br#"[{"b": 1, "a": 2}]"#).unwrap();
        let out = String::from_utf8(codec().encode(&t).unwrap()).unwrap();
        assert!(out.find("\"b\"").unwrap() < out.find("\"a\"").unwrap());
    }

    #[test]
    fn non_sequence_document_is_rejected_at_read() {
        for src in [r#"{"a": [1]}"#, "3", r#""text""#] {
            let err = codec().decode(src.as_bytes()).unwrap_err();
            assert!(
                err.to_string().contains("not a sequence of rows"),
                "{}",
                err
            );
        }
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = codec().decode(b"[[1,2]").unwrap_err();
        assert!(matches!(err, CodecError::Decode { format: Format::Json, .. }));
    }

    #[test]
    fn values_without_json_form_fail_to_encode() {
        let t = Table::new(vec![Cell::List(vec![Cell::Bytes(vec![1])])]);
        assert!(codec().encode(&t).is_err());
        let t = Table::new(vec![Cell::List(vec![Cell::Float(f64::INFINITY)])]);
        assert!(codec().encode(&t).is_err());
        let t = Table::new(vec![Cell::Map(vec![(Cell::Int(1), Cell::Tuple(vec![]))])]);
        let out = String::from_utf8(codec().encode(&t).unwrap()).unwrap();
        assert!(out.contains("\"1\": []"));
    }
}
