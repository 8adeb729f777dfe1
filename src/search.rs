//! Search scope and result bounding

use std::fmt;
use std::str::FromStr;

/// Which messages a SEARCH selects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SearchScope {
    #[default]
    All,
    Unseen,
    /// Caller-supplied search criteria, sent verbatim after `SEARCH`.
    Raw(String),
}

impl SearchScope {
    #[must_use]
    pub fn criteria(&self) -> &str {
        match self {
            Self::All => "ALL",
            Self::Unseen => "UNSEEN",
            Self::Raw(criteria) => criteria,
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.criteria())
    }
}

impl From<&str> for SearchScope {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else if trimmed.eq_ignore_ascii_case("unseen") {
            Self::Unseen
        } else {
            Self::Raw(trimmed.to_string())
        }
    }
}

/// Which end of the SEARCH result the bounded slice is taken from.
///
/// Servers return ascending identifiers, so `Tail` is the most recent
/// messages and `Head` the oldest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SliceFrom {
    #[default]
    Tail,
    Head,
}

impl FromStr for SliceFrom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tail" | "last" | "recent" => Ok(Self::Tail),
            "head" | "first" | "oldest" => Ok(Self::Head),
            other => Err(format!("expected 'tail' or 'head', got '{other}'")),
        }
    }
}

/// Whether identifiers are sequence numbers or UIDs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdMode {
    #[default]
    Sequence,
    Uid,
}

impl IdMode {
    /// Command prefix: empty for sequence numbers, `UID ` for UIDs.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Sequence => "",
            Self::Uid => "UID ",
        }
    }
}

impl FromStr for IdMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequence" | "seq" => Ok(Self::Sequence),
            "uid" => Ok(Self::Uid),
            other => Err(format!("expected 'sequence' or 'uid', got '{other}'")),
        }
    }
}

/// Select at most `limit` identifiers from one end of `ids`, keeping
/// server order.
#[must_use]
pub fn bound_ids(ids: &[u32], limit: usize, from: SliceFrom) -> &[u32] {
    let take = limit.min(ids.len());
    match from {
        SliceFrom::Tail => &ids[ids.len() - take..],
        SliceFrom::Head => &ids[..take],
    }
}
