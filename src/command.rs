//! Command tags and command rendering
//!
//! Every command goes out as a single CRLF-terminated line prefixed by
//! a session-unique tag. Arguments that carry user data (credentials,
//! mailbox names) are emitted as IMAP quoted strings; anything that
//! could break the line framing is refused before a command exists.

use crate::error::{Error, Result};
use crate::search::{IdMode, SearchScope};
use std::fmt;

/// Header fields requested for each summary.
pub const SUMMARY_FIELDS: &str = "SUBJECT FROM DATE";

/// A command tag such as `A7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequential tag source, one per session: `A1`, `A2`, `A3`, ...
#[derive(Debug)]
pub struct TagGenerator {
    next: u32,
}

impl TagGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_tag(&mut self) -> Tag {
        let tag = Tag(format!("A{}", self.next));
        self.next += 1;
        tag
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A client command understood by the session.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Select { mailbox: String },
    Search { mode: IdMode, criteria: String },
    FetchHeaders { mode: IdMode, id: u32 },
    Logout,
}

impl Command {
    /// Build a LOGIN, refusing credentials that would break framing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredential`] if either value contains CR,
    /// LF or NUL.
    pub fn login(username: &str, password: &str) -> Result<Self> {
        check_line_safe(username)
            .map_err(|c| Error::InvalidCredential(format!("username contains {c}")))?;
        check_line_safe(password)
            .map_err(|c| Error::InvalidCredential(format!("password contains {c}")))?;
        Ok(Self::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Build a SELECT for `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mailbox`] if the name is empty or contains CR,
    /// LF or NUL.
    pub fn select(mailbox: &str) -> Result<Self> {
        if mailbox.is_empty() {
            return Err(Error::Mailbox("mailbox name is empty".into()));
        }
        check_line_safe(mailbox)
            .map_err(|c| Error::Mailbox(format!("mailbox name contains {c}")))?;
        Ok(Self::Select {
            mailbox: mailbox.to_string(),
        })
    }

    /// Build a SEARCH (or UID SEARCH) for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if raw criteria are empty or contain
    /// CR, LF or NUL.
    pub fn search(mode: IdMode, scope: &SearchScope) -> Result<Self> {
        let criteria = scope.criteria();
        if criteria.trim().is_empty() {
            return Err(Error::Protocol("search criteria is empty".into()));
        }
        check_line_safe(criteria)
            .map_err(|c| Error::Protocol(format!("search criteria contains {c}")))?;
        Ok(Self::Search {
            mode,
            criteria: criteria.to_string(),
        })
    }

    #[must_use]
    pub const fn fetch_headers(mode: IdMode, id: u32) -> Self {
        Self::FetchHeaders { mode, id }
    }

    /// Verb used in logs and state errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Search { .. } => "SEARCH",
            Self::FetchHeaders { .. } => "FETCH",
            Self::Logout => "LOGOUT",
        }
    }

    /// The full wire line, CRLF included.
    #[must_use]
    pub fn render(&self, tag: &Tag) -> String {
        match self {
            Self::Login { username, password } => {
                format!("{tag} LOGIN {} {}\r\n", quote(username), quote(password))
            }
            Self::Select { mailbox } => format!("{tag} SELECT {}\r\n", quote(mailbox)),
            Self::Search { mode, criteria } => {
                format!("{tag} {}SEARCH {criteria}\r\n", mode.prefix())
            }
            Self::FetchHeaders { mode, id } => {
                let uid_item = if *mode == IdMode::Uid { "UID " } else { "" };
                let section = format!("BODY.PEEK[HEADER.FIELDS ({SUMMARY_FIELDS})]");
                format!("{tag} {}FETCH {id} ({uid_item}{section})\r\n", mode.prefix())
            }
            Self::Logout => format!("{tag} LOGOUT\r\n"),
        }
    }

    /// The line as it may appear in logs.
    #[must_use]
    pub fn redacted(&self, tag: &Tag) -> String {
        match self {
            Self::Login { .. } => format!("{tag} LOGIN <redacted>"),
            other => other.render(tag).trim_end().to_string(),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Select { mailbox } => f.debug_struct("Select").field("mailbox", mailbox).finish(),
            Self::Search { mode, criteria } => f
                .debug_struct("Search")
                .field("mode", mode)
                .field("criteria", criteria)
                .finish(),
            Self::FetchHeaders { mode, id } => f
                .debug_struct("FetchHeaders")
                .field("mode", mode)
                .field("id", id)
                .finish(),
            Self::Logout => f.write_str("Logout"),
        }
    }
}

/// Wrap a value as an IMAP quoted string, escaping `"` and `\`.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Reject characters that would terminate or corrupt a command line.
fn check_line_safe(value: &str) -> std::result::Result<(), &'static str> {
    if value.contains('\r') {
        Err("a carriage return")
    } else if value.contains('\n') {
        Err("a line feed")
    } else if value.contains('\0') {
        Err("a NUL byte")
    } else {
        Ok(())
    }
}
