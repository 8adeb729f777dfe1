//! Header block parsing
//!
//! A FETCH of `BODY.PEEK[HEADER.FIELDS (...)]` returns an RFC 5322
//! header block. [`parse_header_block`] turns it into a field map and
//! is the only place header syntax is interpreted. Values carrying
//! RFC 2047 encoded-words (`=?UTF-8?B?...?=`) are decoded to text.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `name: value` on an unfolded header line.
static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([!-9;-~]+)[ \t]*:[ \t]*(.*)$").expect("valid header field pattern")
});

/// Header fields keyed by lowercase name.
///
/// When a field repeats, the first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    fields: HashMap<String, String>,
}

impl HeaderFields {
    /// Value of `name` (case-insensitive), `None` when absent or blank.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse a raw header block into a field map.
///
/// Folded continuation lines (leading space or tab) are joined onto
/// the previous field with a single space, so every value is one line.
/// Lines that are neither a field nor a continuation are ignored, and
/// parsing stops at the first empty line.
#[must_use]
pub fn parse_header_block(raw: &[u8]) -> HeaderFields {
    let text = String::from_utf8_lossy(raw);
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current: Option<(String, String)> = None;

    for line in text.split('\n').map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = current.as_mut() {
                let piece = line.trim();
                if !piece.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(piece);
                }
            }
            continue;
        }

        flush(&mut fields, current.take());
        if let Some(caps) = FIELD.captures(line) {
            current = Some((caps[1].to_ascii_lowercase(), caps[2].trim().to_string()));
        }
    }
    flush(&mut fields, current);

    HeaderFields { fields }
}

fn flush(fields: &mut HashMap<String, String>, entry: Option<(String, String)>) {
    if let Some((name, value)) = entry {
        fields
            .entry(name)
            .or_insert_with(|| strip_line_breaks(&decode_encoded_words(value)));
    }
}

/// Decode RFC 2047 encoded-words, leaving the value as sent when it has
/// none or they cannot be decoded.
fn decode_encoded_words(value: String) -> String {
    if !value.contains("=?") {
        return value;
    }
    let synthetic = format!("X: {value}");
    match mailparse::parse_header(synthetic.as_bytes()) {
        Ok((header, _)) => header.get_value_utf8().unwrap_or(value),
        Err(_) => value,
    }
}

fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], "")
}
