//! `#!` line parsing.

/// Interpreter name and optional argument taken from a `#!` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Shebang {
    pub(super) name: String,
    pub(super) arg: Option<String>,
}

/// Parses the head of a script. Returns `None` unless it starts with `#!`
/// followed by a non-blank interpreter name.
///
/// Only the first line counts; without a newline the whole head is used.
pub(super) fn parse(head: &[u8]) -> Option<Shebang> {
    let rest = head.strip_prefix(b"#!")?;
    let line_end = rest.iter().position(|byte| *byte == b'\n').unwrap_or(rest.len());
    let line = String::from_utf8_lossy(rest.get(..line_end)?);
    let trimmed = line
        .trim_end_matches([' ', '\t', '\r'])
        .trim_start_matches([' ', '\t']);
    if trimmed.is_empty() {
        return None;
    }
    let (name, remainder) = split_token(trimmed);
    Some(Shebang {
        name: name.to_owned(),
        arg: remainder.map(str::to_owned),
    })
}

/// Splits at the first blank run; the remainder is never empty.
pub(super) fn split_token(text: &str) -> (&str, Option<&str>) {
    match text.find([' ', '\t']) {
        Some(index) => {
            let (token, tail) = text.split_at(index);
            let remainder = tail.trim_start_matches([' ', '\t']);
            (token, (!remainder.is_empty()).then_some(remainder))
        }
        None => (text, None),
    }
}
