// Pickle stream reader for plain data (protocols 0-5).
// Containers are built in an object table and referenced by index from the
// stack and the memo, so a list appended to after being memoized, or shared
// between two rows, is seen the same way CPython's unpickler sees it. The
// table is flattened into a `Cell` tree at STOP. Shared references are copied
// out once per use, so the flattened size is capped.
use std::collections::HashMap;

use crate::codec::{Format, FormatCodec};
use crate::error::CodecError;
use crate::model::{Cell, Table};
use crate::pickle_write::{PickleOpts, write_pickle};

/// Opcode bytes shared by the reader and the writer.
pub(crate) mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const DUP: u8 = b'2';
    pub const FLOAT: u8 = b'F';
    pub const INT: u8 = b'I';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const LONG: u8 = b'L';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const PERSID: u8 = b'P';
    pub const BINPERSID: u8 = b'Q';
    pub const REDUCE: u8 = b'R';
    pub const STRING: u8 = b'S';
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
    pub const UNICODE: u8 = b'V';
    pub const BINUNICODE: u8 = b'X';
    pub const APPEND: u8 = b'a';
    pub const BUILD: u8 = b'b';
    pub const GLOBAL: u8 = b'c';
    pub const DICT: u8 = b'd';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPENDS: u8 = b'e';
    pub const GET: u8 = b'g';
    pub const BINGET: u8 = b'h';
    pub const INST: u8 = b'i';
    pub const LONG_BINGET: u8 = b'j';
    pub const LIST: u8 = b'l';
    pub const EMPTY_LIST: u8 = b']';
    pub const OBJ: u8 = b'o';
    pub const PUT: u8 = b'p';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const SETITEM: u8 = b's';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';
    // protocol 2
    pub const PROTO: u8 = 0x80;
    pub const NEWOBJ: u8 = 0x81;
    pub const EXT1: u8 = 0x82;
    pub const EXT2: u8 = 0x83;
    pub const EXT4: u8 = 0x84;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const LONG4: u8 = 0x8b;
    // protocol 3
    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';
    // protocol 4
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const EMPTY_SET: u8 = 0x8f;
    pub const ADDITEMS: u8 = 0x90;
    pub const FROZENSET: u8 = 0x91;
    pub const NEWOBJ_EX: u8 = 0x92;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
    // protocol 5
    pub const BYTEARRAY8: u8 = 0x96;
    pub const NEXT_BUFFER: u8 = 0x97;
    pub const READONLY_BUFFER: u8 = 0x98;
}

pub const HIGHEST_PROTOCOL: u8 = 5;

// Cells a stream may expand to when flattened: this many per input byte, and
// never less than MIN_EXPANSION.
const EXPANSION_PER_BYTE: usize = 16;
const MIN_EXPANSION: usize = 100_000;

#[derive(Debug, Clone)]
enum Item {
    Value(Cell),
    Ref(usize), // index into Parser::objects
}

#[derive(Debug, Clone)]
enum Container {
    List(Vec<Item>),
    Tuple(Vec<Item>),
    Dict(Vec<(Item, Item)>),
    Set(Vec<Item>),
    FrozenSet(Vec<Item>),
}

#[derive(Debug)]
pub struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    stack: Vec<Item>,
    marks: Vec<usize>,
    memo: HashMap<u64, Item>,
    objects: Vec<Container>,
}

struct Walk {
    visiting: Vec<bool>,
    remaining: usize,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
            objects: Vec::new(),
        }
    }

    pub fn parse_stream(&mut self) -> Result<Cell, String> {
        loop {
            let code = self.read_u8()?;
            match code {
                op::PROTO => {
                    let proto = self.read_u8()?;
                    if proto > HIGHEST_PROTOCOL {
                        return Err(format!("unsupported pickle protocol {}", proto));
                    }
                }
                op::FRAME => {
                    let _frame_len = self.read_u64()?;
                }
                op::STOP => {
                    let item = self.pop()?;
                    let mut walk = Walk {
                        visiting: vec![false; self.objects.len()],
                        remaining: self
                            .data
                            .len()
                            .saturating_mul(EXPANSION_PER_BYTE)
                            .max(MIN_EXPANSION),
                    };
                    return self.materialize(&item, &mut walk);
                }

                op::MARK => self.marks.push(self.stack.len()),
                op::POP => {
                    if self.marks.last() == Some(&self.stack.len()) {
                        self.pop_mark()?;
                    } else {
                        self.pop()?;
                    }
                }
                op::POP_MARK => {
                    self.pop_mark()?;
                }
                op::DUP => {
                    let top = self.stack.last().cloned().ok_or_else(|| self.underflow())?;
                    self.stack.push(top);
                }

                op::NONE => self.push_value(Cell::Null),
                op::NEWTRUE => self.push_value(Cell::Bool(true)),
                op::NEWFALSE => self.push_value(Cell::Bool(false)),
                op::BININT => {
                    let v = self.read_i32()?;
                    self.push_value(Cell::Int(v as i64));
                }
                op::BININT1 => {
                    let v = self.read_u8()?;
                    self.push_value(Cell::Int(v as i64));
                }
                op::BININT2 => {
                    let v = self.read_u16()?;
                    self.push_value(Cell::Int(v as i64));
                }
                op::LONG1 => {
                    let n = self.read_u8()? as usize;
                    let v = self.read_long(n)?;
                    self.push_value(v);
                }
                op::LONG4 => {
                    let n = self.read_i32()?;
                    let n = usize::try_from(n).map_err(|_| "negative LONG4 byte count".to_string())?;
                    let v = self.read_long(n)?;
                    self.push_value(v);
                }
                op::BINFLOAT => {
                    let v = self.read_f64_be()?;
                    self.push_value(Cell::Float(v));
                }
                op::INT => {
                    let line = self.read_line()?;
                    let v = match line {
                        "00" => Cell::Bool(false),
                        "01" => Cell::Bool(true),
                        _ => self.parse_text_int(line)?,
                    };
                    self.push_value(v);
                }
                op::LONG => {
                    let line = self.read_line()?;
                    let v = self.parse_text_int(line.trim_end_matches('L'))?;
                    self.push_value(v);
                }
                op::FLOAT => {
                    let line = self.read_line()?;
                    let v: f64 = line
                        .parse()
                        .map_err(|_| format!("invalid FLOAT '{}' at {:#x}", line, self.pos))?;
                    self.push_value(Cell::Float(v));
                }

                op::SHORT_BINUNICODE => {
                    let n = self.read_u8()? as usize;
                    let s = self.read_str(n)?;
                    self.push_value(Cell::text(s));
                }
                op::BINUNICODE => {
                    let n = self.read_u32()? as usize;
                    let s = self.read_str(n)?;
                    self.push_value(Cell::text(s));
                }
                op::BINUNICODE8 => {
                    let n = self.read_len64()?;
                    let s = self.read_str(n)?;
                    self.push_value(Cell::text(s));
                }
                op::SHORT_BINSTRING => {
                    let n = self.read_u8()? as usize;
                    let s = self.read_str(n)?;
                    self.push_value(Cell::text(s));
                }
                op::BINSTRING => {
                    let n = self.read_i32()?;
                    let n = usize::try_from(n).map_err(|_| "negative BINSTRING length".to_string())?;
                    let s = self.read_str(n)?;
                    self.push_value(Cell::text(s));
                }
                op::UNICODE => {
                    let line = self.read_line()?;
                    let s = decode_raw_unicode_escape(line)?;
                    self.push_value(Cell::Text(s));
                }
                op::SHORT_BINBYTES => {
                    let n = self.read_u8()? as usize;
                    let b = self.read_slice(n)?;
                    self.push_value(Cell::Bytes(b.to_vec()));
                }
                op::BINBYTES => {
                    let n = self.read_u32()? as usize;
                    let b = self.read_slice(n)?;
                    self.push_value(Cell::Bytes(b.to_vec()));
                }
                op::BINBYTES8 | op::BYTEARRAY8 => {
                    let n = self.read_len64()?;
                    let b = self.read_slice(n)?;
                    self.push_value(Cell::Bytes(b.to_vec()));
                }

                op::EMPTY_LIST => self.push_container(Container::List(Vec::new())),
                op::EMPTY_TUPLE => self.push_value(Cell::Tuple(Vec::new())),
                op::EMPTY_DICT => self.push_container(Container::Dict(Vec::new())),
                op::EMPTY_SET => self.push_container(Container::Set(Vec::new())),
                op::LIST => {
                    let items = self.pop_mark()?;
                    self.push_container(Container::List(items));
                }
                op::TUPLE => {
                    let items = self.pop_mark()?;
                    self.push_container(Container::Tuple(items));
                }
                op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                    let n = (code - op::TUPLE1 + 1) as usize;
                    if self.stack.len() < n {
                        return Err(self.underflow());
                    }
                    let items = self.stack.split_off(self.stack.len() - n);
                    self.push_container(Container::Tuple(items));
                }
                op::FROZENSET => {
                    let items = self.pop_mark()?;
                    self.push_container(Container::FrozenSet(items));
                }
                op::DICT => {
                    let items = self.pop_mark()?;
                    let pairs = pairs_of(items).ok_or_else(|| self.odd_items("DICT"))?;
                    self.push_container(Container::Dict(pairs));
                }
                op::APPEND => {
                    let v = self.pop()?;
                    let at = self.pos - 1;
                    match self.top_container("APPEND")? {
                        Container::List(items) => items.push(v),
                        _ => return Err(wrong_target("APPEND", "list", at)),
                    }
                }
                op::APPENDS => {
                    let vs = self.pop_mark()?;
                    let at = self.pos - 1;
                    match self.top_container("APPENDS")? {
                        Container::List(items) => items.extend(vs),
                        _ => return Err(wrong_target("APPENDS", "list", at)),
                    }
                }
                op::SETITEM => {
                    let v = self.pop()?;
                    let k = self.pop()?;
                    let at = self.pos - 1;
                    match self.top_container("SETITEM")? {
                        Container::Dict(pairs) => pairs.push((k, v)),
                        _ => return Err(wrong_target("SETITEM", "dict", at)),
                    }
                }
                op::SETITEMS => {
                    let items = self.pop_mark()?;
                    let new_pairs = pairs_of(items).ok_or_else(|| self.odd_items("SETITEMS"))?;
                    let at = self.pos - 1;
                    match self.top_container("SETITEMS")? {
                        Container::Dict(pairs) => pairs.extend(new_pairs),
                        _ => return Err(wrong_target("SETITEMS", "dict", at)),
                    }
                }
                op::ADDITEMS => {
                    let vs = self.pop_mark()?;
                    let at = self.pos - 1;
                    match self.top_container("ADDITEMS")? {
                        Container::Set(items) => items.extend(vs),
                        _ => return Err(wrong_target("ADDITEMS", "set", at)),
                    }
                }

                op::MEMOIZE => {
                    let id = self.memo.len() as u64;
                    self.memo_put(id)?;
                }
                op::BINPUT => {
                    let id = self.read_u8()? as u64;
                    self.memo_put(id)?;
                }
                op::LONG_BINPUT => {
                    let id = self.read_u32()? as u64;
                    self.memo_put(id)?;
                }
                op::PUT => {
                    let line = self.read_line()?;
                    let id = self.parse_memo_id(line)?;
                    self.memo_put(id)?;
                }
                op::BINGET => {
                    let id = self.read_u8()? as u64;
                    self.memo_get(id)?;
                }
                op::LONG_BINGET => {
                    let id = self.read_u32()? as u64;
                    self.memo_get(id)?;
                }
                op::GET => {
                    let line = self.read_line()?;
                    let id = self.parse_memo_id(line)?;
                    self.memo_get(id)?;
                }

                op::GLOBAL | op::STACK_GLOBAL | op::REDUCE | op::BUILD | op::INST | op::OBJ
                | op::NEWOBJ | op::NEWOBJ_EX | op::EXT1 | op::EXT2 | op::EXT4 | op::PERSID
                | op::BINPERSID => {
                    return Err(format!(
                        "opcode {:#04x} at {:#x} loads a class instance, which cannot be a cell",
                        code,
                        self.pos - 1
                    ));
                }
                op::STRING | op::NEXT_BUFFER | op::READONLY_BUFFER => {
                    return Err(format!(
                        "opcode {:#04x} at {:#x} is not supported",
                        code,
                        self.pos - 1
                    ));
                }
                _ => {
                    return Err(format!(
                        "unknown opcode {:#04x} at {:#x}",
                        code,
                        self.pos - 1
                    ));
                }
            }
        }
    }

    fn materialize(&self, item: &Item, walk: &mut Walk) -> Result<Cell, String> {
        if walk.remaining == 0 {
            return Err(format!(
                "shared references expand past {} values",
                self.data.len().saturating_mul(EXPANSION_PER_BYTE).max(MIN_EXPANSION)
            ));
        }
        walk.remaining -= 1;
        let id = match item {
            Item::Value(v) => return Ok(v.clone()),
            Item::Ref(id) => *id,
        };
        if walk.visiting[id] {
            return Err(format!("recursive structure through object {}", id));
        }
        walk.visiting[id] = true;
        let all = |items: &[Item], walk: &mut Walk| -> Result<Vec<Cell>, String> {
            items.iter().map(|it| self.materialize(it, walk)).collect()
        };
        let cell = match &self.objects[id] {
            Container::List(items) => Cell::List(all(items, walk)?),
            Container::Tuple(items) => Cell::Tuple(all(items, walk)?),
            Container::Set(items) => Cell::Set(all(items, walk)?),
            Container::FrozenSet(items) => Cell::FrozenSet(all(items, walk)?),
            Container::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((self.materialize(k, walk)?, self.materialize(v, walk)?));
                }
                Cell::Map(out)
            }
        };
        walk.visiting[id] = false;
        Ok(cell)
    }

    // Stack helpers
    fn push_value(&mut self, v: Cell) {
        self.stack.push(Item::Value(v));
    }
    fn push_container(&mut self, c: Container) {
        self.objects.push(c);
        self.stack.push(Item::Ref(self.objects.len() - 1));
    }
    fn pop(&mut self) -> Result<Item, String> {
        if self.marks.last() == Some(&self.stack.len()) {
            return Err(self.underflow());
        }
        self.stack.pop().ok_or_else(|| self.underflow())
    }
    fn pop_mark(&mut self) -> Result<Vec<Item>, String> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| format!("no MARK on the stack at {:#x}", self.pos - 1))?;
        Ok(self.stack.split_off(mark))
    }
    // The target must sit above the innermost MARK.
    fn top_container(&mut self, opname: &str) -> Result<&mut Container, String> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() <= floor {
            return Err(format!(
                "{} at {:#x} has no container above the mark",
                opname,
                self.pos - 1
            ));
        }
        match self.stack.last() {
            Some(Item::Ref(id)) => {
                let id = *id;
                Ok(&mut self.objects[id])
            }
            _ => Err(format!(
                "{} at {:#x} needs a container on the stack",
                opname,
                self.pos - 1
            )),
        }
    }
    fn memo_put(&mut self, id: u64) -> Result<(), String> {
        let top = self.stack.last().cloned().ok_or_else(|| self.underflow())?;
        self.memo.insert(id, top);
        Ok(())
    }
    fn memo_get(&mut self, id: u64) -> Result<(), String> {
        let item = self
            .memo
            .get(&id)
            .cloned()
            .ok_or_else(|| format!("memo key {} not found at {:#x}", id, self.pos))?;
        self.stack.push(item);
        Ok(())
    }

    fn underflow(&self) -> String {
        format!("stack underflow at {:#x}", self.pos.saturating_sub(1))
    }
    fn odd_items(&self, opname: &str) -> String {
        format!("{} at {:#x} has an odd number of items", opname, self.pos - 1)
    }

    fn parse_text_int(&self, s: &str) -> Result<Cell, String> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Cell::Int(i));
        }
        s.parse::<u64>()
            .map(Cell::UInt)
            .map_err(|_| format!("integer '{}' at {:#x} does not fit in 64 bits", s, self.pos))
    }
    fn parse_memo_id(&self, s: &str) -> Result<u64, String> {
        s.trim()
            .parse()
            .map_err(|_| format!("invalid memo key '{}' at {:#x}", s, self.pos))
    }

    // Little-endian two's complement of `n` bytes, as LONG1/LONG4 store it.
    // Non-negative values up to u64::MAX come back as `UInt` once they pass
    // i64::MAX.
    fn read_long(&mut self, n: usize) -> Result<Cell, String> {
        let start = self.pos;
        let bytes = self.read_slice(n)?;
        let Some(&last) = bytes.last() else {
            return Ok(Cell::Int(0));
        };
        let negative = last & 0x80 != 0;
        let fill = if negative { 0xff } else { 0x00 };
        let mut len = bytes.len();
        while len > 1 && bytes[len - 1] == fill && (bytes[len - 2] & 0x80 != 0) == negative {
            len -= 1;
        }
        let digits = &bytes[..len];
        if digits.len() <= 8 {
            let mut buf = [fill; 8];
            buf[..digits.len()].copy_from_slice(digits);
            return Ok(Cell::Int(i64::from_le_bytes(buf)));
        }
        if !negative && digits.len() == 9 && digits[8] == 0 {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&digits[..8]);
            return Ok(Cell::UInt(u64::from_le_bytes(buf)));
        }
        Err(format!("integer at {:#x} does not fit in 64 bits", start))
    }

    // Low-level utilities
    fn read_u8(&mut self) -> Result<u8, String> {
        if self.pos >= self.data.len() {
            return Err("eof before STOP".into());
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }
    fn read_u16(&mut self) -> Result<u16, String> {
        let s = self.read_slice(2)?;
        Ok(u16::from_le_bytes([s[0], s[1]]))
    }
    fn read_u32(&mut self) -> Result<u32, String> {
        let s = self.read_slice(4)?;
        Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
    }
    fn read_i32(&mut self) -> Result<i32, String> {
        Ok(self.read_u32()? as i32)
    }
    fn read_u64(&mut self) -> Result<u64, String> {
        let s = self.read_slice(8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(s);
        Ok(u64::from_le_bytes(b))
    }
    fn read_f64_be(&mut self) -> Result<f64, String> {
        let s = self.read_slice(8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(s);
        Ok(f64::from_be_bytes(b))
    }
    fn read_len64(&mut self) -> Result<usize, String> {
        let n = self.read_u64()?;
        usize::try_from(n).map_err(|_| format!("length {} too large", n))
    }
    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], String> {
        if len > self.data.len() - self.pos {
            return Err("eof before STOP".into());
        }
        let s = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(s)
    }
    fn read_str(&mut self, len: usize) -> Result<&'a str, String> {
        let start = self.pos;
        let s = self.read_slice(len)?;
        std::str::from_utf8(s).map_err(|_| format!("invalid utf8 in string at {:#x}", start))
    }
    // Text opcodes end their argument with a newline.
    fn read_line(&mut self) -> Result<&'a str, String> {
        let start = self.pos;
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| format!("unterminated line at {:#x}", start))?;
        self.pos += end + 1;
        std::str::from_utf8(&rest[..end]).map_err(|_| format!("invalid utf8 in line at {:#x}", start))
    }
}

fn wrong_target(opname: &str, want: &str, at: usize) -> String {
    format!("{} at {:#x} expects a {}", opname, at, want)
}

fn pairs_of(items: Vec<Item>) -> Option<Vec<(Item, Item)>> {
    if items.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut it = items.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        out.push((k, v));
    }
    Some(out)
}

// Protocol 0 UNICODE arguments escape only \uXXXX and \UXXXXXXXX.
fn decode_raw_unicode_escape(s: &str) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let mut ahead = chars.clone();
        let width = match ahead.next() {
            Some('u') => 4,
            Some('U') => 8,
            _ => {
                out.push(c);
                continue;
            }
        };
        let hex: String = ahead.by_ref().take(width).collect();
        if hex.len() != width {
            return Err(format!("truncated \\{} escape", if width == 4 { 'u' } else { 'U' }));
        }
        let code = u32::from_str_radix(&hex, 16).map_err(|_| format!("bad escape '{}'", hex))?;
        out.push(char::from_u32(code).ok_or_else(|| format!("invalid code point {:#x}", code))?);
        chars = ahead;
    }
    Ok(out)
}

/// Python pickle streams whose top-level list or tuple holds the rows.
pub struct PickleCodec {
    opts: PickleOpts,
}

impl PickleCodec {
    pub fn new(opts: PickleOpts) -> Self {
        Self { opts }
    }
}

impl FormatCodec for PickleCodec {
    fn format(&self) -> Format {
        Format::Pickle
    }

    fn decode(&self, data: &[u8]) -> Result<Table, CodecError> {
        let root = Parser::new(data)
            .parse_stream()
            .map_err(|e| CodecError::decode(Format::Pickle, e))?;
        Table::from_root(root).map_err(|e| CodecError::decode(Format::Pickle, e))
    }

    fn encode(&self, table: &Table) -> Result<Vec<u8>, CodecError> {
        write_pickle(&table.to_root(), self.opts.protocol)
            .map_err(|e| CodecError::encode(Format::Pickle, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(data: &[u8]) -> Result<Cell, String> {
        Parser::new(data).parse_stream()
    }

    fn texts(items: &[&str]) -> Cell {
        Cell::List(items.iter().map(|s| Cell::text(*s)).collect())
    }

    #[test]
    fn protocol4_framed_rows() {
        let data = b"\x80\x04\x95\x1d\x00\x00\x00\x00\x00\x00\x00]\x94(]\x94(\x8c\x01a\x94\x8c\x01b\x94e]\x94(\x8c\x01c\x94\x8c\x01d\x94ee.";
        assert_eq!(
            parse(data).unwrap(),
            Cell::List(vec![texts(&["a", "b"]), texts(&["c", "d"])])
        );
    }

    #[test]
    fn memo_reference_shares_a_list_filled_later() {
        // the inner list is memoized while empty and appended to afterwards
        let data = b"\x80\x02]q\x00(]q\x01K\x01ah\x01e.";
        let one = Cell::List(vec![Cell::Int(1)]);
        assert_eq!(parse(data).unwrap(), Cell::List(vec![one.clone(), one]));
    }

    #[test]
    fn protocol0_text_opcodes() {
        let data = b"(lp0\n(lp1\nI1\naVx\\u00e9\np2\naa(F2.5\nNI01\ntp3\na.";
        assert_eq!(
            parse(data).unwrap(),
            Cell::List(vec![
                Cell::List(vec![Cell::Int(1), Cell::text("x\u{e9}")]),
                Cell::Tuple(vec![Cell::Float(2.5), Cell::Null, Cell::Bool(true)]),
            ])
        );
    }

    #[test]
    fn dicts_longs_and_floats() {
        let data = b"\x80\x02]q\x00(}q\x01(X\x01\x00\x00\x00kq\x02K\x07u\x8a\x05\x00\x00\x00\x00\x01\x8a\x01\xffG?\xf8\x00\x00\x00\x00\x00\x00e.";
        assert_eq!(
            parse(data).unwrap(),
            Cell::List(vec![
                Cell::Map(vec![(Cell::text("k"), Cell::Int(7))]),
                Cell::Int(1 << 32),
                Cell::Int(-1),
                Cell::Float(1.5),
            ])
        );
    }

    #[test]
    fn sets_and_bytes() {
        let data = b"\x80\x04](\x8f(K\x01K\x02\x90(C\x02hi\x91e.";
        assert_eq!(
            parse(data).unwrap(),
            Cell::List(vec![
                Cell::Set(vec![Cell::Int(1), Cell::Int(2)]),
                Cell::FrozenSet(vec![Cell::Bytes(b"hi".to_vec())]),
            ])
        );
    }

    #[test]
    fn rejects_class_instances() {
        let data = b"\x80\x02c__main__\nFoo\nq\x00)\x81q\x01.";
        let err = parse(data).unwrap_err();
        assert!(err.contains("class instance"), "{}", err);
    }

    #[test]
    fn rejects_recursive_lists() {
        let err = parse(b"\x80\x02]q\x00h\x00a.").unwrap_err();
        assert!(err.contains("recursive"), "{}", err);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        assert!(parse(b"\x80\x04]").unwrap_err().contains("eof"));
        assert!(parse(b"").is_err());
    }

    #[test]
    fn longs_up_to_u64_max_are_kept() {
        // 2**63 needs nine bytes
        assert_eq!(
            parse(b"\x80\x02\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x80\x00.").unwrap(),
            Cell::UInt(1 << 63)
        );
        // -2**63 fits in eight
        assert_eq!(
            parse(b"\x80\x02\x8a\x08\x00\x00\x00\x00\x00\x00\x00\x80.").unwrap(),
            Cell::Int(i64::MIN)
        );
        // non-minimal encodings still decode
        assert_eq!(parse(b"\x80\x02\x8a\x03\x05\x00\x00.").unwrap(), Cell::Int(5));
        assert_eq!(
            parse(b"L18446744073709551615L\n.").unwrap(),
            Cell::UInt(u64::MAX)
        );
        // 2**64 and -2**63 - 1 do not fit
        let err = parse(b"\x80\x02\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x00\x01.").unwrap_err();
        assert!(err.contains("64 bits"), "{}", err);
        let err = parse(b"\x80\x02\x8a\x09\xff\xff\xff\xff\xff\xff\xff\x7f\xff.").unwrap_err();
        assert!(err.contains("64 bits"), "{}", err);
    }

    #[test]
    fn doubling_shared_lists_hit_the_expansion_cap() {
        // x[k + 1] = [x[k], x[k]] for 40 levels: tiny on disk, 2**40 cells flat
        let mut data = vec![op::PROTO, 2, op::EMPTY_LIST, op::BINPUT, 0];
        for k in 0..40u8 {
            data.extend_from_slice(&[
                op::EMPTY_LIST,
                op::MARK,
                op::BINGET,
                k,
                op::BINGET,
                k,
                op::APPENDS,
                op::BINPUT,
                k + 1,
            ]);
        }
        data.push(op::STOP);
        let err = parse(&data).unwrap_err();
        assert!(err.contains("expand past"), "{}", err);

        // a few levels stay well under the cap
        let mut small = vec![op::PROTO, 2, op::EMPTY_LIST, op::BINPUT, 0];
        for k in 0..3u8 {
            small.extend_from_slice(&[
                op::EMPTY_LIST,
                op::MARK,
                op::BINGET,
                k,
                op::BINGET,
                k,
                op::APPENDS,
                op::BINPUT,
                k + 1,
            ]);
        }
        small.push(op::STOP);
        let root = parse(&small).unwrap();
        let one = Cell::List(vec![Cell::List(vec![]), Cell::List(vec![])]);
        let two = Cell::List(vec![one.clone(), one]);
        assert_eq!(root, Cell::List(vec![two.clone(), two]));
    }

    #[test]
    fn append_below_the_mark_is_malformed() {
        let err = parse(b"\x80\x02](K\x01a.").unwrap_err();
        assert!(err.contains("above the mark"), "{}", err);
        let err = parse(b"\x80\x02}(K\x01K\x02s.").unwrap_err();
        assert!(err.contains("above the mark"), "{}", err);
        // the same opcodes without a dangling MARK are fine
        assert_eq!(
            parse(b"\x80\x02]K\x01a.").unwrap(),
            Cell::List(vec![Cell::Int(1)])
        );
    }

    #[test]
    fn codec_rejects_scalar_documents() {
        let codec = PickleCodec::new(PickleOpts::default());
        let err = codec.decode(b"\x80\x02K\x05.").unwrap_err();
        assert!(err.to_string().contains("not a sequence of rows"));
        let t = codec.decode(b"\x80\x02]q\x00(]q\x01K\x01ah\x01e.").unwrap();
        assert_eq!(t.row_count(), 2);
    }
}
