//! Error types for imap-mailbox-reader

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out after {seconds:.1}s: {context}")]
    Timeout { seconds: f64, context: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Mailbox error: {0}")]
    Mailbox(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Fetch failed for message {id}: {reason}")]
    Fetch { id: u32, reason: String },

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("{command} is not allowed in the {state} state")]
    InvalidState {
        command: &'static str,
        state: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error aborts the whole operation.
    ///
    /// Only per-message fetch failures are absorbed; everything else
    /// leaves the session unusable or the request unanswerable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Fetch { .. })
    }

    /// Stable machine-readable name of the error variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout { .. } => "timeout",
            Self::Auth(_) => "auth",
            Self::Mailbox(_) => "mailbox",
            Self::Protocol(_) => "protocol",
            Self::Fetch { .. } => "fetch",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::InvalidState { .. } => "invalid_state",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Tls(_) => "tls",
        }
    }

    /// Render the error as a payload safe to hand to an API caller.
    #[must_use]
    pub fn report(&self, hint: CredentialHint) -> FailureReport {
        FailureReport {
            error: self.to_string(),
            kind: self.kind(),
            hint,
        }
    }
}

/// Credential shape for diagnostics: lengths only, never values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialHint {
    pub username_chars: usize,
    pub password_chars: usize,
}

impl CredentialHint {
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username_chars: username.chars().count(),
            password_chars: password.chars().count(),
        }
    }
}

impl fmt::Display for CredentialHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "username: {} chars, password: {} chars",
            self.username_chars, self.password_chars
        )
    }
}

/// Structured failure payload for an aborted operation.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub error: String,
    pub kind: &'static str,
    pub hint: CredentialHint,
}
