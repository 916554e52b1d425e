use crate::model::Cell;
use crate::pickle::{HIGHEST_PROTOCOL, op};

// CPython batches APPENDS/SETITEMS/ADDITEMS in groups of this size.
const BATCHSIZE: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct PickleOpts {
    pub protocol: u8,
}

impl Default for PickleOpts {
    fn default() -> Self {
        Self { protocol: 4 }
    }
}

/// Serialize a cell tree as a pickle stream of the given protocol (2-5).
pub fn write_pickle(root: &Cell, protocol: u8) -> Result<Vec<u8>, String> {
    if !(2..=HIGHEST_PROTOCOL).contains(&protocol) {
        return Err(format!(
            "unsupported pickle protocol {} (expected 2..={})",
            protocol, HIGHEST_PROTOCOL
        ));
    }
    let mut w = Writer::new(protocol);
    w.write_cell(root)?;
    w.push(op::STOP);

    let mut out = Vec::with_capacity(w.out.len() + 11);
    out.push(op::PROTO);
    out.push(protocol);
    // protocol 4+ streams carry their body in frames; one frame holds it all
    if protocol >= 4 && w.out.len() >= 4 {
        out.push(op::FRAME);
        out.extend_from_slice(&(w.out.len() as u64).to_le_bytes());
    }
    out.extend_from_slice(&w.out);
    Ok(out)
}

struct Writer {
    out: Vec<u8>,
    protocol: u8,
}

impl Writer {
    fn new(protocol: u8) -> Self {
        Self {
            out: Vec::with_capacity(1024),
            protocol,
        }
    }
    fn push(&mut self, b: u8) {
        self.out.push(b);
    }
    fn write_u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }
    fn write_u64(&mut self, v: u64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn write_cell(&mut self, c: &Cell) -> Result<(), String> {
        match c {
            Cell::Null => self.push(op::NONE),
            Cell::Bool(b) => self.push(if *b { op::NEWTRUE } else { op::NEWFALSE }),
            Cell::Int(i) => self.write_int(*i),
            Cell::UInt(u) => match i64::try_from(*u) {
                Ok(i) => self.write_int(i),
                Err(_) => {
                    // top bit set: eight magnitude bytes and a zero sign byte
                    self.push(op::LONG1);
                    self.push(9);
                    self.out.extend_from_slice(&u.to_le_bytes());
                    self.push(0);
                }
            },
            Cell::Float(f) => {
                self.push(op::BINFLOAT);
                self.out.extend_from_slice(&f.to_be_bytes());
            }
            Cell::Text(s) => self.write_text(s),
            Cell::Bytes(b) => self.write_bytes(b)?,
            Cell::List(items) => {
                self.push(op::EMPTY_LIST);
                self.write_batched(items, op::APPEND, op::APPENDS)?;
            }
            Cell::Tuple(items) => self.write_tuple(items)?,
            Cell::Map(pairs) => {
                self.push(op::EMPTY_DICT);
                for batch in pairs.chunks(BATCHSIZE) {
                    if let [(k, v)] = batch {
                        self.write_cell(k)?;
                        self.write_cell(v)?;
                        self.push(op::SETITEM);
                    } else {
                        self.push(op::MARK);
                        for (k, v) in batch {
                            self.write_cell(k)?;
                            self.write_cell(v)?;
                        }
                        self.push(op::SETITEMS);
                    }
                }
            }
            Cell::Set(items) => {
                self.require_protocol(4, "set")?;
                self.push(op::EMPTY_SET);
                for batch in items.chunks(BATCHSIZE) {
                    self.push(op::MARK);
                    for it in batch {
                        self.write_cell(it)?;
                    }
                    self.push(op::ADDITEMS);
                }
            }
            Cell::FrozenSet(items) => {
                self.require_protocol(4, "frozenset")?;
                self.push(op::MARK);
                for it in items {
                    self.write_cell(it)?;
                }
                self.push(op::FROZENSET);
            }
        }
        Ok(())
    }

    fn require_protocol(&self, min: u8, what: &str) -> Result<(), String> {
        if self.protocol < min {
            return Err(format!(
                "{} values need pickle protocol {} or higher (writing {})",
                what, min, self.protocol
            ));
        }
        Ok(())
    }

    fn write_int(&mut self, v: i64) {
        if (0..=0xff).contains(&v) {
            self.push(op::BININT1);
            self.push(v as u8);
        } else if (0..=0xffff).contains(&v) {
            self.push(op::BININT2);
            self.out.extend_from_slice(&(v as u16).to_le_bytes());
        } else if let Ok(x) = i32::try_from(v) {
            self.push(op::BININT);
            self.out.extend_from_slice(&x.to_le_bytes());
        } else {
            let bytes = long_bytes(v);
            self.push(op::LONG1);
            self.push(bytes.len() as u8);
            self.out.extend_from_slice(&bytes);
        }
    }

    fn write_text(&mut self, s: &str) {
        let n = s.len();
        if self.protocol >= 4 && n < 256 {
            self.push(op::SHORT_BINUNICODE);
            self.push(n as u8);
        } else if self.protocol >= 4 && n > u32::MAX as usize {
            self.push(op::BINUNICODE8);
            self.write_u64(n as u64);
        } else {
            self.push(op::BINUNICODE);
            self.write_u32(n as u32);
        }
        self.out.extend_from_slice(s.as_bytes());
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<(), String> {
        self.require_protocol(3, "bytes")?;
        let n = b.len();
        if n < 256 {
            self.push(op::SHORT_BINBYTES);
            self.push(n as u8);
        } else if n <= u32::MAX as usize {
            self.push(op::BINBYTES);
            self.write_u32(n as u32);
        } else {
            self.require_protocol(4, "bytes over 4 GiB")?;
            self.push(op::BINBYTES8);
            self.write_u64(n as u64);
        }
        self.out.extend_from_slice(b);
        Ok(())
    }

    fn write_tuple(&mut self, items: &[Cell]) -> Result<(), String> {
        if items.is_empty() {
            self.push(op::EMPTY_TUPLE);
            return Ok(());
        }
        if items.len() <= 3 {
            for it in items {
                self.write_cell(it)?;
            }
            self.push(op::TUPLE1 + (items.len() as u8 - 1));
            return Ok(());
        }
        self.push(op::MARK);
        for it in items {
            self.write_cell(it)?;
        }
        self.push(op::TUPLE);
        Ok(())
    }

    // Single-item batches use the one-item opcode, like CPython does.
    fn write_batched(&mut self, items: &[Cell], one: u8, many: u8) -> Result<(), String> {
        for batch in items.chunks(BATCHSIZE) {
            if let [it] = batch {
                self.write_cell(it)?;
                self.push(one);
            } else {
                self.push(op::MARK);
                for it in batch {
                    self.write_cell(it)?;
                }
                self.push(many);
            }
        }
        Ok(())
    }
}

// Shortest little-endian two's complement form, as LONG1 expects.
fn long_bytes(v: i64) -> Vec<u8> {
    let mut b = v.to_le_bytes().to_vec();
    while b.len() > 1 {
        let last = b[b.len() - 1];
        let sign_of_prev = b[b.len() - 2] & 0x80;
        if (last == 0x00 && sign_of_prev == 0) || (last == 0xff && sign_of_prev != 0) {
            b.pop();
        } else {
            break;
        }
    }
    b
}
