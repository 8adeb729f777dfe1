//! Message summaries returned to callers

use crate::header::parse_header_block;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SUBJECT: &str = "No Subject";
pub const DEFAULT_FROM: &str = "Unknown";

/// Subject, sender and date of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Sequence number or UID, depending on the session's id mode.
    pub id: u32,
    pub subject: String,
    pub from: String,
    /// RFC 3339 when the header parses as an RFC 2822 date, otherwise
    /// the header value as sent.
    pub date: String,
}

impl MessageSummary {
    /// Build a summary from a raw header block, defaulting missing
    /// fields.
    #[must_use]
    pub fn from_header_block(id: u32, raw: &[u8]) -> Self {
        let fields = parse_header_block(raw);
        let date = fields.get("date").map_or_else(now_rfc3339, normalize_date);

        Self {
            id,
            subject: fields.get("subject").unwrap_or(DEFAULT_SUBJECT).to_string(),
            from: fields.get("from").unwrap_or(DEFAULT_FROM).to_string(),
            date,
        }
    }
}

/// Result of listing a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxListing {
    pub mailbox: String,
    /// Number of identifiers the SEARCH matched, before bounding.
    pub total: usize,
    /// Summaries that were fetched successfully, in SEARCH order.
    pub emails: Vec<MessageSummary>,
}

fn normalize_date(raw: &str) -> String {
    DateTime::parse_from_rfc2822(raw).map_or_else(
        |_| raw.to_string(),
        |dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false),
    )
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
