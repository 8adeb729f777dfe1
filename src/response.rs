//! Response framing and parsing
//!
//! Bytes from the socket are accumulated in a [`LineBuffer`] until a
//! complete logical line is available. A line ending in `{n}` announces
//! a counted literal: exactly `n` raw bytes follow, after which the same
//! logical line continues. FETCH header blocks arrive this way, so a
//! response is never considered complete at its first CRLF.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Largest literal accepted from the server.
pub const MAX_LITERAL: usize = 16 * 1024 * 1024;

/// Largest amount of unframed data held while waiting for a CRLF.
const MAX_PENDING: usize = MAX_LITERAL + 64 * 1024;

static UID_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[( ]UID (\d+)").expect("valid UID pattern"));

static UID_VALIDITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[UIDVALIDITY (\d+)\]").expect("valid UIDVALIDITY pattern"));

/// One logical response line.
///
/// `text` holds the protocol text with literal payloads cut out (the
/// `{n}` markers stay in place); `literals` holds the payloads in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

impl ResponseLine {
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            literals: Vec::new(),
        }
    }
}

/// Accumulates raw bytes and yields complete [`ResponseLine`]s.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete logical line, if the buffer holds one.
    pub fn next_line(&mut self) -> Result<Option<ResponseLine>> {
        let mut pos = 0;
        let mut text = Vec::new();
        let mut literals = Vec::new();

        loop {
            let Some(rel) = find_crlf(&self.buf[pos..]) else {
                return self.incomplete();
            };
            let segment_end = pos + rel;
            let segment = &self.buf[pos..segment_end];
            text.extend_from_slice(segment);
            let after = segment_end + 2;

            match literal_len(segment)? {
                Some(len) => {
                    if self.buf.len() < after + len {
                        return self.incomplete();
                    }
                    literals.push(self.buf[after..after + len].to_vec());
                    pos = after + len;
                }
                None => {
                    self.buf.drain(..after);
                    return Ok(Some(ResponseLine {
                        text: String::from_utf8_lossy(&text).into_owned(),
                        literals,
                    }));
                }
            }
        }
    }

    fn incomplete(&self) -> Result<Option<ResponseLine>> {
        if self.buf.len() > MAX_PENDING {
            return Err(Error::Protocol(format!(
                "server sent {} bytes without completing a line",
                self.buf.len()
            )));
        }
        Ok(None)
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\r\n")
}

/// Length announced by a trailing `{n}` (or non-synchronizing `{n+}`).
fn literal_len(segment: &[u8]) -> Result<Option<usize>> {
    let Some(inner) = segment
        .strip_suffix(b"}")
        .and_then(|s| s.iter().rposition(|&b| b == b'{').map(|open| &s[open + 1..]))
    else {
        return Ok(None);
    };
    let digits = inner.strip_suffix(b"+").unwrap_or(inner);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Ok(None);
    }
    let len: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| Error::Protocol("literal length out of range".into()))?;
    if len > MAX_LITERAL {
        return Err(Error::Protocol(format!(
            "literal of {len} bytes exceeds the {MAX_LITERAL} byte limit"
        )));
    }
    Ok(Some(len))
}

/// Outcome carried by a tagged completion line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

/// A tagged completion: `<tag> OK|NO|BAD <text>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub tag: String,
    pub status: Status,
    pub text: String,
}

impl Completion {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// The completion line as sent, for error messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let status = match self.status {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
        };
        if self.text.is_empty() {
            format!("{} {status}", self.tag)
        } else {
            format!("{} {status} {}", self.tag, self.text)
        }
    }
}

/// Classification of a single response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Untagged(ResponseLine),
    Continuation(String),
    Tagged(Completion),
}

impl Frame {
    pub fn classify(line: ResponseLine) -> Result<Self> {
        if line.text == "*" || line.text.starts_with("* ") {
            return Ok(Self::Untagged(line));
        }
        if let Some(rest) = line.text.strip_prefix('+') {
            return Ok(Self::Continuation(rest.trim().to_string()));
        }

        let mut parts = line.text.splitn(3, ' ');
        let tag = parts.next().unwrap_or_default();
        let status = match parts.next().map(str::to_ascii_uppercase).as_deref() {
            Some("OK") => Status::Ok,
            Some("NO") => Status::No,
            Some("BAD") => Status::Bad,
            _ => {
                return Err(Error::Protocol(format!(
                    "unrecognised response line: {}",
                    truncate(&line.text, 80)
                )));
            }
        };
        if tag.is_empty() {
            return Err(Error::Protocol("completion line without a tag".into()));
        }
        Ok(Self::Tagged(Completion {
            tag: tag.to_string(),
            status,
            text: parts.next().unwrap_or_default().trim().to_string(),
        }))
    }
}

/// Everything the server sent for one command.
#[derive(Debug, Clone)]
pub struct Response {
    pub untagged: Vec<ResponseLine>,
    pub completion: Completion,
}

/// Untagged payload after the `* `, if the line is untagged.
fn untagged_body(line: &ResponseLine) -> Option<&str> {
    line.text.strip_prefix("* ")
}

/// Whether an untagged line is `* BYE ...`.
#[must_use]
pub fn is_bye(line: &ResponseLine) -> bool {
    untagged_body(line).is_some_and(|body| {
        body.get(..3)
            .is_some_and(|word| word.eq_ignore_ascii_case("BYE"))
    })
}

/// Collect identifiers from every `* SEARCH` line, in server order.
pub fn parse_search(untagged: &[ResponseLine]) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for line in untagged {
        let Some(body) = untagged_body(line) else {
            continue;
        };
        let mut words = body.split_ascii_whitespace();
        if !words
            .next()
            .is_some_and(|w| w.eq_ignore_ascii_case("SEARCH"))
        {
            continue;
        }
        for word in words {
            let id = word.parse::<u32>().map_err(|_| {
                Error::Protocol(format!("non-numeric SEARCH result '{}'", truncate(word, 20)))
            })?;
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Mailbox facts reported by SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    pub exists: Option<u32>,
    pub uid_validity: Option<u32>,
}

#[must_use]
pub fn parse_select(untagged: &[ResponseLine]) -> MailboxStatus {
    let mut status = MailboxStatus::default();
    for line in untagged {
        let Some(body) = untagged_body(line) else {
            continue;
        };
        let mut words = body.split_ascii_whitespace();
        if let (Some(n), Some(kind)) = (words.next(), words.next())
            && kind.eq_ignore_ascii_case("EXISTS")
        {
            status.exists = n.parse().ok();
        }
        if let Some(caps) = UID_VALIDITY.captures(body) {
            status.uid_validity = caps[1].parse().ok();
        }
    }
    status
}

/// The parts of a `* n FETCH (...)` line the summary needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchItem {
    pub seq: u32,
    pub uid: Option<u32>,
    /// Raw header block; `None` when the line carried no header section.
    pub header: Option<Vec<u8>>,
}

/// Parse an untagged FETCH line. Returns `None` for other lines.
pub fn parse_fetch(line: &ResponseLine) -> Option<Result<FetchItem>> {
    let body = untagged_body(line)?;
    let mut words = body.splitn(3, ' ');
    let seq = words.next()?;
    if !words.next()?.eq_ignore_ascii_case("FETCH") {
        return None;
    }
    let Ok(seq) = seq.parse::<u32>() else {
        return Some(Err(Error::Protocol(format!(
            "invalid FETCH sequence number '{}'",
            truncate(seq, 20)
        ))));
    };
    let items = words.next().unwrap_or_default();

    let uid = UID_ITEM.captures(items).and_then(|caps| caps[1].parse().ok());
    Some(header_section(items, &line.literals).map(|header| FetchItem { seq, uid, header }))
}

/// Locate `BODY[HEADER.FIELDS (...)]` and return its value: a literal,
/// a quoted string, or NIL (empty).
fn header_section(items: &str, literals: &[Vec<u8>]) -> Result<Option<Vec<u8>>> {
    let upper = items.to_ascii_uppercase();
    let Some(start) = upper.find("BODY[HEADER") else {
        return Ok(None);
    };
    let Some(close) = upper[start..].find(']') else {
        return Err(Error::Protocol("unterminated BODY section".into()));
    };
    let value = items[start + close + 1..].trim_start();

    if value.starts_with('{') {
        // Literals are stored in order; count the markers before this one.
        let index = literal_index(&items[..start + close + 1]);
        return literals
            .get(index)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::Protocol("FETCH literal announced but missing".into()));
    }
    if let Some(quoted) = value.strip_prefix('"') {
        return unquote(quoted).map(|s| Some(s.into_bytes()));
    }
    if value.get(..3).is_some_and(|w| w.eq_ignore_ascii_case("NIL")) {
        return Ok(Some(Vec::new()));
    }
    Err(Error::Protocol(format!(
        "unexpected header section value '{}'",
        truncate(value, 20)
    )))
}

/// Number of `{n}` literal markers in `prefix`.
fn literal_index(prefix: &str) -> usize {
    prefix
        .match_indices('{')
        .filter(|&(i, _)| {
            prefix[i + 1..].find('}').is_some_and(|end| {
                let inner = &prefix[i + 1..i + 1 + end];
                let digits = inner.strip_suffix('+').unwrap_or(inner);
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            })
        })
        .count()
}

/// Decode the remainder of a quoted string (opening quote removed).
fn unquote(rest: &str) -> Result<String> {
    let mut out = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => break,
            },
            _ => out.push(c),
        }
    }
    Err(Error::Protocol("unterminated quoted string".into()))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}
