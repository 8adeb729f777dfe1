//! Read-only IMAP mailbox reader
//!
//! Connects to an IMAP server over implicit TLS (Gmail at
//! `imap.gmail.com:993` by default), logs in with an app password,
//! selects a mailbox, searches it, and fetches the `Subject`, `From`
//! and `Date` headers of a bounded slice of the matches. Message
//! bodies are never requested.
//!
//! [`MailReader`] is the entry point; [`Session`] exposes the
//! underlying state machine for callers that drive the protocol
//! themselves.

mod client;
mod command;
mod config;
mod connection;
mod error;
mod folder;
mod header;
mod response;
mod search;
mod session;
mod summary;

pub use client::{ListRequest, MailReader};
pub use command::{Command, Tag, TagGenerator, quote};
pub use config::{ImapConfig, TlsMode};
pub use connection::{ImapSession, connect, tls_connector};
pub use error::{CredentialHint, Error, FailureReport, Result};
pub use folder::Folder;
pub use header::{HeaderFields, parse_header_block};
pub use response::MailboxStatus;
pub use search::{IdMode, SearchScope, SliceFrom, bound_ids};
pub use session::{Session, SessionState};
pub use summary::{MailboxListing, MessageSummary};
