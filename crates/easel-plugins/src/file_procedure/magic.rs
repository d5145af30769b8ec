//! Magic rules attached to file procedures.
//!
//! Rules are written as comma-separated `offset,type,value` triples:
//!
//! ```text
//! 0,string,\x89PNG
//! 0&,byte&0xf0,0x40,4,size,>16
//! -4,long,=0x49454e44
//! ```
//!
//! Offsets may be negative (counted from the end of the file). A `&` in the
//! offset field ANDs the rule with the next one. Numbers accept decimal,
//! `0x` hexadecimal and leading-zero octal.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::error::FileProcedureError;

/// Number of head bytes read once per lookup.
pub const MAGIC_HEAD_SIZE: usize = 256;

/// Fewer head bytes than this disable magic matching.
pub const MIN_MAGIC_HEAD: usize = 4;

const MAGIC_HEAD_LIMIT: u64 = 256;

/// Strength of a magic match; later variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MagicMatch {
    /// No rule group matched.
    None,
    /// Only a file size test matched.
    Size,
    /// Real content bytes matched.
    Bytes(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Less,
    /// Written `>`; the test is greater-or-equal.
    AtLeast,
    Equal,
}

impl Comparator {
    const fn holds(self, actual: i64, expected: i64) -> bool {
        match self {
            Self::Less => actual < expected,
            Self::AtLeast => actual >= expected,
            Self::Equal => actual == expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MagicTest {
    Numeric {
        width: usize,
        mask: Option<i64>,
        comparator: Comparator,
        value: i64,
    },
    Size {
        comparator: Comparator,
        value: i64,
    },
    String(Vec<u8>),
}

/// One parsed `offset,type,value` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicRule {
    offset: i64,
    and_next: bool,
    test: MagicTest,
}

impl MagicRule {
    /// Returns `true` when the rule is ANDed with the following one.
    #[must_use]
    pub const fn and_next(&self) -> bool {
        self.and_next
    }

    /// Returns `true` for file size tests.
    #[must_use]
    pub const fn is_size_test(&self) -> bool {
        matches!(self.test, MagicTest::Size { .. })
    }

    fn check(&self, source: &mut MagicSource) -> RuleOutcome {
        match &self.test {
            MagicTest::Size { comparator, value } => {
                let size = i64::try_from(source.size).unwrap_or(i64::MAX);
                if comparator.holds(size, *value) {
                    RuleOutcome::Size
                } else {
                    RuleOutcome::Failed
                }
            }
            MagicTest::Numeric {
                width,
                mask,
                comparator,
                value,
            } => {
                let Some(bytes) = source.read_at(self.offset, *width) else {
                    return RuleOutcome::Failed;
                };
                let raw = bytes
                    .iter()
                    .fold(0_i64, |acc, byte| (acc << 8) | i64::from(*byte));
                let actual = mask.map_or(raw, |bits| raw & bits);
                if comparator.holds(actual, *value) {
                    RuleOutcome::Bytes(*width)
                } else {
                    RuleOutcome::Failed
                }
            }
            MagicTest::String(expected) => match source.read_at(self.offset, expected.len()) {
                Some(bytes) if bytes == *expected => RuleOutcome::Bytes(expected.len()),
                _ => RuleOutcome::Failed,
            },
        }
    }
}

enum RuleOutcome {
    Failed,
    Size,
    Bytes(usize),
}

/// Parses a comma-separated rule list. An empty list yields no rules.
///
/// # Errors
///
/// Returns [`FileProcedureError::InvalidMagic`] for a malformed triple.
pub fn parse_magics(text: &str) -> Result<Vec<MagicRule>, FileProcedureError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let fields: Vec<&str> = text.split(',').collect();
    let triples = fields.chunks_exact(3);
    if !triples.remainder().is_empty() {
        return Err(invalid(text, "rules must be offset,type,value triples"));
    }
    triples
        .map(|triple| match triple {
            [offset, kind, value] => parse_rule(offset, kind, value),
            _ => Err(invalid(text, "rules must be offset,type,value triples")),
        })
        .collect()
}

fn parse_rule(offset: &str, kind: &str, value: &str) -> Result<MagicRule, FileProcedureError> {
    let rule = format!("{offset},{kind},{value}");
    let and_next = offset.contains('&');
    let offset_text: String = offset.chars().filter(|c| *c != '&').collect();
    let offset_value =
        parse_number(&offset_text).ok_or_else(|| invalid(&rule, "offset is not a number"))?;

    let (type_name, mask_text) = match kind.split_once('&') {
        Some((name, mask)) => (name, Some(mask)),
        None => (kind, None),
    };
    let test = match type_name {
        "byte" | "short" | "long" => {
            let width = match type_name {
                "byte" => 1,
                "short" => 2,
                _ => 4,
            };
            let mask = mask_text
                .map(|text| parse_number(text).ok_or_else(|| invalid(&rule, "mask is not a number")))
                .transpose()?;
            let (comparator, number) = split_comparator(value);
            MagicTest::Numeric {
                width,
                mask,
                comparator,
                value: parse_number(number).ok_or_else(|| invalid(&rule, "value is not a number"))?,
            }
        }
        "size" if mask_text.is_none() => {
            let (comparator, number) = split_comparator(value);
            MagicTest::Size {
                comparator,
                value: parse_number(number).ok_or_else(|| invalid(&rule, "size is not a number"))?,
            }
        }
        "string" if mask_text.is_none() => {
            let bytes = unescape(value);
            if bytes.is_empty() {
                return Err(invalid(&rule, "string value is empty"));
            }
            MagicTest::String(bytes)
        }
        _ => return Err(invalid(&rule, "unknown rule type")),
    };
    Ok(MagicRule {
        offset: offset_value,
        and_next,
        test,
    })
}

fn invalid(rule: &str, reason: &'static str) -> FileProcedureError {
    FileProcedureError::InvalidMagic {
        rule: rule.to_owned(),
        reason,
    }
}

fn split_comparator(value: &str) -> (Comparator, &str) {
    if let Some(rest) = value.strip_prefix('<') {
        (Comparator::Less, rest)
    } else if let Some(rest) = value.strip_prefix('>') {
        (Comparator::AtLeast, rest)
    } else if let Some(rest) = value.strip_prefix('=') {
        (Comparator::Equal, rest)
    } else {
        (Comparator::Equal, value)
    }
}

/// Parses decimal, `0x` hexadecimal or leading-zero octal, optionally
/// negative.
pub(super) fn parse_number(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(digits.get(1..)?, 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Decodes C escapes in a string rule.
pub(super) fn unescape(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while let Some(&byte) = bytes.get(index) {
        index += 1;
        if byte != b'\\' {
            decoded.push(byte);
            continue;
        }
        let Some(&escape) = bytes.get(index) else {
            decoded.push(byte);
            break;
        };
        index += 1;
        match escape {
            b'a' => decoded.push(0x07),
            b'b' => decoded.push(0x08),
            b'f' => decoded.push(0x0c),
            b'n' => decoded.push(b'\n'),
            b'r' => decoded.push(b'\r'),
            b't' => decoded.push(b'\t'),
            b'v' => decoded.push(0x0b),
            b'x' => {
                let digits = take_digits(bytes, &mut index, 2, |b| b.is_ascii_hexdigit());
                decoded.push(decode_digits(digits, 16).unwrap_or(b'x'));
            }
            b'0'..=b'7' => {
                index -= 1;
                let digits = take_digits(bytes, &mut index, 3, |b| (b'0'..=b'7').contains(&b));
                decoded.push(decode_digits(digits, 8).unwrap_or(0));
            }
            other => decoded.push(other),
        }
    }
    decoded
}

fn take_digits<'a>(
    bytes: &'a [u8],
    index: &mut usize,
    limit: usize,
    accept: impl Fn(u8) -> bool,
) -> &'a [u8] {
    let start = *index;
    while *index - start < limit && bytes.get(*index).is_some_and(|b| accept(*b)) {
        *index += 1;
    }
    bytes.get(start..*index).unwrap_or_default()
}

fn decode_digits(digits: &[u8], radix: u32) -> Option<u8> {
    if digits.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(text, radix)
        .ok()
        .and_then(|value| u8::try_from(value & 0xff).ok())
}

/// Scores `rules` against one file; the best AND group counts.
pub(super) fn check_rules(rules: &[MagicRule], source: &mut MagicSource) -> MagicMatch {
    let mut best = MagicMatch::None;
    let mut group = GroupScore::default();
    for rule in rules {
        group.add(rule.check(source));
        if !rule.and_next() {
            best = best.max(group.finish());
            group = GroupScore::default();
        }
    }
    if group.started {
        best = best.max(group.finish());
    }
    best
}

#[derive(Default)]
struct GroupScore {
    started: bool,
    failed: bool,
    bytes: usize,
    size_matched: bool,
}

impl GroupScore {
    fn add(&mut self, outcome: RuleOutcome) {
        self.started = true;
        match outcome {
            RuleOutcome::Failed => self.failed = true,
            RuleOutcome::Size => self.size_matched = true,
            RuleOutcome::Bytes(count) => self.bytes += count,
        }
    }

    fn finish(&self) -> MagicMatch {
        if self.failed || !self.started {
            MagicMatch::None
        } else if self.bytes > 0 {
            MagicMatch::Bytes(self.bytes + usize::from(self.size_matched))
        } else if self.size_matched {
            MagicMatch::Size
        } else {
            MagicMatch::None
        }
    }
}

/// Lazily-read view of the file under inspection.
pub(super) struct MagicSource {
    head: Vec<u8>,
    file: File,
    size: u64,
}

impl MagicSource {
    /// Reads the head of `file`. Returns `None` when fewer than
    /// [`MIN_MAGIC_HEAD`] bytes are available.
    pub(super) fn open(mut file: File) -> Option<Self> {
        let size = file.metadata().ok()?.len();
        let mut head = Vec::with_capacity(MAGIC_HEAD_SIZE);
        (&mut file)
            .take(MAGIC_HEAD_LIMIT)
            .read_to_end(&mut head)
            .ok()?;
        if head.len() < MIN_MAGIC_HEAD {
            return None;
        }
        Some(Self { head, file, size })
    }

    fn read_at(&mut self, offset: i64, len: usize) -> Option<Vec<u8>> {
        let start = if offset < 0 {
            self.size.checked_sub(offset.unsigned_abs())?
        } else {
            offset.unsigned_abs()
        };
        let start_index = usize::try_from(start).ok()?;
        if let Some(window) = self.head.get(start_index..start_index.checked_add(len)?) {
            return Some(window.to_vec());
        }
        self.file.seek(SeekFrom::Start(start)).ok()?;
        let mut buffer = vec![0; len];
        self.file.read_exact(&mut buffer).ok()?;
        Some(buffer)
    }
}
