//! Parser for binfmt-style interpreter records.
//!
//! A record looks like `:name:type:offset:magic:mask:program:` where the
//! first character is the field delimiter. Type `E` maps a file extension
//! (carried in the magic field) to a program; type `M` maps a masked byte
//! pattern at a fixed offset.

use super::BUFSIZE;

const MIN_RECORD_LEN: usize = 10;
const MAX_RECORD_LEN: usize = 255;
const MAX_MAGIC_OFFSET: usize = BUFSIZE / 4;
const MAX_MAGIC_END: usize = BUFSIZE / 2;

/// A byte pattern identifying scripts for an interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct InterpreterMagic {
    pub(super) name: String,
    pub(super) offset: usize,
    pub(super) pattern: Vec<u8>,
    pub(super) mask: Option<Vec<u8>>,
    pub(super) program: String,
}

impl InterpreterMagic {
    /// Compares the masked window of `head` at the configured offset.
    pub(super) fn matches(&self, head: &[u8]) -> bool {
        let end = self.offset + self.pattern.len();
        let Some(window) = head.get(self.offset..end) else {
            return false;
        };
        match &self.mask {
            Some(mask) => window
                .iter()
                .zip(mask)
                .zip(&self.pattern)
                .all(|((byte, mask_byte), expected)| byte & mask_byte == *expected),
            None => window == self.pattern.as_slice(),
        }
    }
}

/// A successfully parsed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum BinfmtRecord {
    Extension {
        name: String,
        extension: String,
        program: String,
    },
    Magic(InterpreterMagic),
}

/// Parses one record; the error names the rule the record broke.
pub(super) fn parse(line: &str) -> Result<BinfmtRecord, &'static str> {
    if !(MIN_RECORD_LEN..=MAX_RECORD_LEN).contains(&line.len()) {
        return Err("record length out of range");
    }
    let mut chars = line.chars();
    let delimiter = chars.next().ok_or("empty record")?;
    let body = chars.as_str();
    let record = body.strip_suffix(delimiter).unwrap_or(body);

    let fields: Vec<&str> = record.split(delimiter).collect();
    let [name, kind, offset, magic, mask, program] = fields.as_slice() else {
        return Err("record must have six fields");
    };
    if name.is_empty() {
        return Err("record name is empty");
    }
    if program.is_empty() {
        return Err("program is empty");
    }
    match *kind {
        "E" => parse_extension(name, magic, program),
        "M" => parse_magic(name, offset, magic, mask, program).map(BinfmtRecord::Magic),
        "" => Err("record type is empty"),
        other if other.chars().count() > 1 => Err("record type must be one character"),
        _ => Err("unknown record type"),
    }
}

fn parse_extension(
    name: &str,
    extension: &str,
    program: &str,
) -> Result<BinfmtRecord, &'static str> {
    if extension.is_empty() {
        return Err("extension is empty");
    }
    if extension.contains('/') {
        return Err("extension contains a path separator");
    }
    Ok(BinfmtRecord::Extension {
        name: name.to_owned(),
        extension: extension.to_owned(),
        program: program.to_owned(),
    })
}

fn parse_magic(
    name: &str,
    offset: &str,
    magic: &str,
    mask: &str,
    program: &str,
) -> Result<InterpreterMagic, &'static str> {
    let offset_value = if offset.is_empty() {
        0
    } else {
        offset
            .parse::<usize>()
            .map_err(|_| "offset is not a decimal number")?
    };
    if offset_value > MAX_MAGIC_OFFSET {
        return Err("offset is too large");
    }
    let pattern = unquote(magic).ok_or("magic contains a malformed escape")?;
    if pattern.is_empty() {
        return Err("magic is empty");
    }
    let mask_bytes = if mask.is_empty() {
        None
    } else {
        let bytes = unquote(mask).ok_or("mask contains a malformed escape")?;
        if bytes.len() != pattern.len() {
            return Err("mask and magic differ in length");
        }
        Some(bytes)
    };
    if offset_value + pattern.len() > MAX_MAGIC_END {
        return Err("magic extends past the inspected head");
    }
    Ok(InterpreterMagic {
        name: name.to_owned(),
        offset: offset_value,
        pattern,
        mask: mask_bytes,
        program: program.to_owned(),
    })
}

/// Decodes `\xHH` escapes; every other byte is taken literally.
pub(super) fn unquote(field: &str) -> Option<Vec<u8>> {
    let bytes = field.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while let Some(&byte) = bytes.get(index) {
        if byte == b'\\' && bytes.get(index + 1) == Some(&b'x') {
            let high = hex_digit(*bytes.get(index + 2)?)?;
            let low = hex_digit(*bytes.get(index + 3)?)?;
            decoded.push((high << 4) | low);
            index += 4;
        } else {
            decoded.push(byte);
            index += 1;
        }
    }
    Some(decoded)
}

const fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
