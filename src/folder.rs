//! Mailbox names
//!
//! Gmail exposes its system labels under the `[Gmail]/` hierarchy.
//! [`Folder`] maps the short names people type ("sent", "spam") onto
//! those hierarchy paths so a SELECT always names a real mailbox.

use std::fmt;

/// A mailbox to SELECT.
///
/// # Examples
///
/// ```
/// use imap_mailbox_reader::Folder;
///
/// assert_eq!(Folder::Inbox.as_str(), "INBOX");
/// assert_eq!(Folder::from("sent").as_str(), "[Gmail]/Sent Mail");
/// assert_eq!(Folder::custom("Clients/Acme").as_str(), "Clients/Acme");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Folder {
    /// The INBOX (RFC 3501 reserves the name, case-insensitive).
    #[default]
    Inbox,
    /// `[Gmail]/All Mail`
    AllMail,
    /// `[Gmail]/Sent Mail`
    Sent,
    /// `[Gmail]/Drafts`
    Drafts,
    /// `[Gmail]/Starred`
    Starred,
    /// `[Gmail]/Important`
    Important,
    /// `[Gmail]/Spam`
    Spam,
    /// `[Gmail]/Trash`
    Trash,
    /// A user label or any other server-specific mailbox, sent verbatim.
    Custom(String),
}

impl Folder {
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// The mailbox name as it appears on the wire (before quoting).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inbox => "INBOX",
            Self::AllMail => "[Gmail]/All Mail",
            Self::Sent => "[Gmail]/Sent Mail",
            Self::Drafts => "[Gmail]/Drafts",
            Self::Starred => "[Gmail]/Starred",
            Self::Important => "[Gmail]/Important",
            Self::Spam => "[Gmail]/Spam",
            Self::Trash => "[Gmail]/Trash",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Folder {
    fn from(s: &str) -> Self {
        let short = s.strip_prefix("[Gmail]/").unwrap_or(s);
        match short.to_ascii_lowercase().as_str() {
            "inbox" => Self::Inbox,
            "all" | "all mail" => Self::AllMail,
            "sent" | "sent mail" => Self::Sent,
            "drafts" => Self::Drafts,
            "starred" => Self::Starred,
            "important" => Self::Important,
            "spam" => Self::Spam,
            "trash" => Self::Trash,
            _ => Self::Custom(s.to_string()),
        }
    }
}

impl From<String> for Folder {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}
