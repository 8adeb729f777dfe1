//! IMAP connection configuration

use crate::error::{CredentialHint, Error, Result};
use crate::folder::Folder;
use crate::search::{IdMode, SearchScope, SliceFrom};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "imap.gmail.com";
pub const DEFAULT_PORT: u16 = 993;
pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Length of a Gmail app password, spaces excluded.
pub const APP_PASSWORD_LEN: usize = 16;

/// How the server certificate is verified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify against the bundled Mozilla root store.
    #[default]
    WebPki,
    /// Verify against the certificates in a PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate. Only for local relays and test servers.
    Insecure,
}

/// IMAP connection and listing configuration
#[derive(Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: Folder,
    pub search: SearchScope,
    /// Upper bound on the number of messages fetched per listing.
    pub limit: usize,
    pub slice: SliceFrom,
    pub id_mode: IdMode,
    /// Budget for TCP connect, TLS handshake and greeting together.
    pub connect_timeout: Duration,
    /// Budget for each command's complete response.
    pub command_timeout: Duration,
    pub tls: TlsMode,
}

impl ImapConfig {
    /// Configuration for Gmail with the given credentials and defaults
    /// for everything else.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            mailbox: Folder::Inbox,
            search: SearchScope::All,
            limit: DEFAULT_LIMIT,
            slice: SliceFrom::Tail,
            id_mode: IdMode::Sequence,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            tls: TlsMode::WebPki,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `GMAIL_IMAP_USER`
    /// - `GMAIL_IMAP_PASS`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `imap.gmail.com`)
    /// - `IMAP_PORT` (default: `993`)
    /// - `IMAP_MAILBOX` (default: `INBOX`)
    /// - `IMAP_SEARCH` (default: `ALL`; `UNSEEN` or raw criteria)
    /// - `IMAP_LIMIT` (default: `10`)
    /// - `IMAP_SLICE` (default: `tail`)
    /// - `IMAP_ID_MODE` (default: `sequence`)
    /// - `IMAP_CONNECT_TIMEOUT_SECS` (default: `15`)
    /// - `IMAP_COMMAND_TIMEOUT_SECS` (default: `30`)
    /// - `IMAP_TLS_CA_FILE` (PEM bundle to trust instead of web roots)
    /// - `IMAP_TLS_INSECURE` (default: `false`)
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is missing or a variable does
    /// not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable source.
    ///
    /// # Errors
    ///
    /// Same as [`ImapConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let username = lookup("GMAIL_IMAP_USER")
            .ok_or_else(|| Error::Config("GMAIL_IMAP_USER not set".into()))?;
        let password = lookup("GMAIL_IMAP_PASS")
            .ok_or_else(|| Error::Config("GMAIL_IMAP_PASS not set".into()))?;

        let mut config = Self::new(username, password);

        if let Some(host) = lookup("IMAP_HOST") {
            config.host = host;
        }
        config.port = parse_or(&lookup, "IMAP_PORT", DEFAULT_PORT)?;
        if let Some(mailbox) = lookup("IMAP_MAILBOX") {
            config.mailbox = Folder::from(mailbox);
        }
        if let Some(search) = lookup("IMAP_SEARCH") {
            config.search = SearchScope::from(search.as_str());
        }
        config.limit = parse_or(&lookup, "IMAP_LIMIT", DEFAULT_LIMIT)?;
        config.slice = parse_or(&lookup, "IMAP_SLICE", SliceFrom::Tail)?;
        config.id_mode = parse_or(&lookup, "IMAP_ID_MODE", IdMode::Sequence)?;
        config.connect_timeout = Duration::from_secs(parse_or(
            &lookup,
            "IMAP_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT.as_secs(),
        )?);
        config.command_timeout = Duration::from_secs(parse_or(
            &lookup,
            "IMAP_COMMAND_TIMEOUT_SECS",
            DEFAULT_COMMAND_TIMEOUT.as_secs(),
        )?);

        let insecure = parse_or(&lookup, "IMAP_TLS_INSECURE", false)?;
        config.tls = match (insecure, lookup("IMAP_TLS_CA_FILE")) {
            (true, Some(_)) => {
                return Err(Error::Config(
                    "IMAP_TLS_INSECURE and IMAP_TLS_CA_FILE are mutually exclusive".into(),
                ));
            }
            (true, None) => TlsMode::Insecure,
            (false, Some(path)) => TlsMode::CustomCa(PathBuf::from(path)),
            (false, None) => TlsMode::WebPki,
        };

        if config.connect_timeout.is_zero() || config.command_timeout.is_zero() {
            return Err(Error::Config("timeouts must be at least one second".into()));
        }
        Ok(config)
    }

    /// Whether both credentials are available in the environment.
    #[must_use]
    pub fn is_configured() -> bool {
        dotenvy::dotenv().ok();
        credentials_present(|name| env::var(name).ok())
    }

    #[must_use]
    pub fn credential_hint(&self) -> CredentialHint {
        CredentialHint::new(&self.username, &self.password)
    }

    /// Whether the password has the shape of a Gmail app password.
    ///
    /// Google displays app passwords in four groups of four; the
    /// spaces are not part of the password.
    #[must_use]
    pub fn looks_like_app_password(&self) -> bool {
        self.password.chars().filter(|c| !c.is_whitespace()).count() == APP_PASSWORD_LEN
    }
}

impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .field("search", &self.search)
            .field("limit", &self.limit)
            .field("slice", &self.slice)
            .field("id_mode", &self.id_mode)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("tls", &self.tls)
            .finish()
    }
}

fn credentials_present(lookup: impl Fn(&str) -> Option<String>) -> bool {
    ["GMAIL_IMAP_USER", "GMAIL_IMAP_PASS"]
        .iter()
        .all(|name| lookup(name).is_some_and(|v| !v.is_empty()))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup(name).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {name}: {e}")))
    })
}
