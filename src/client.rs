//! Mailbox reader

use crate::config::ImapConfig;
use crate::connection::{self, ImapSession};
use crate::error::{CredentialHint, Result};
use crate::folder::Folder;
use crate::search::{IdMode, SearchScope, SliceFrom, bound_ids};
use crate::session::SessionState;
use crate::summary::MailboxListing;
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

/// What to list. Defaults come from [`ImapConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub mailbox: Folder,
    pub scope: SearchScope,
    pub limit: usize,
    pub slice: SliceFrom,
    pub id_mode: IdMode,
}

impl ListRequest {
    #[must_use]
    pub fn from_config(config: &ImapConfig) -> Self {
        Self {
            mailbox: config.mailbox.clone(),
            scope: config.search.clone(),
            limit: config.limit,
            slice: config.slice,
            id_mode: config.id_mode,
        }
    }
}

/// Read-only IMAP client.
///
/// Holds the configuration and a TLS connector built once; every
/// operation opens its own session and closes it before returning, so
/// one reader can serve any number of concurrent callers.
pub struct MailReader {
    config: ImapConfig,
    connector: TlsConnector,
}

impl MailReader {
    /// Create a reader, building the TLS connector for `config.tls`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`](crate::Error::Tls) if the CA file cannot be
    /// loaded.
    pub fn new(config: ImapConfig) -> Result<Self> {
        if config.host.ends_with("gmail.com") && !config.looks_like_app_password() {
            warn!(
                "Password is {} characters; Gmail expects a 16 character app password",
                config.password.chars().count()
            );
        }
        let connector = connection::tls_connector(&config.tls)?;
        Ok(Self { config, connector })
    }

    #[must_use]
    pub const fn config(&self) -> &ImapConfig {
        &self.config
    }

    /// Credential lengths for attaching to failure reports.
    #[must_use]
    pub fn credential_hint(&self) -> CredentialHint {
        self.config.credential_hint()
    }

    /// List recent messages using the configured request.
    ///
    /// # Errors
    ///
    /// Same as [`MailReader::list`].
    pub async fn list_recent(&self) -> Result<MailboxListing> {
        self.list(&ListRequest::from_config(&self.config)).await
    }

    /// Search a mailbox and fetch summaries for a bounded slice of the
    /// matches.
    ///
    /// Messages that fail to fetch individually are skipped, so the
    /// listing may hold fewer entries than requested. The session is
    /// closed on every path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, LOGIN, SELECT or SEARCH
    /// fails, or if the transport fails during FETCH.
    pub async fn list(&self, request: &ListRequest) -> Result<MailboxListing> {
        let mut session = self.open().await?;
        let outcome = Self::run_listing(&mut session, request).await;
        session.close().await;
        outcome
    }

    /// Connect, log in and log out, to validate credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or LOGIN fails.
    pub async fn verify_login(&self) -> Result<()> {
        let mut session = self.open().await?;
        session.close().await;
        info!("Credentials accepted by {}", self.config.host);
        Ok(())
    }

    /// Connect and authenticate. The session is closed before any
    /// error returns.
    async fn open(&self) -> Result<ImapSession> {
        let mut session = connection::connect(&self.config, &self.connector).await?;
        if session.state() == SessionState::Connected
            && let Err(e) = session
                .login(&self.config.username, &self.config.password)
                .await
        {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn run_listing(
        session: &mut ImapSession,
        request: &ListRequest,
    ) -> Result<MailboxListing> {
        session.set_id_mode(request.id_mode);
        session.select(request.mailbox.as_str()).await?;

        let ids = session.search(&request.scope).await?;
        let selected = bound_ids(&ids, request.limit, request.slice);
        info!(
            "Fetching {} of {} messages matching {}",
            selected.len(),
            ids.len(),
            request.scope
        );

        let emails = session.fetch_summaries(selected).await?;
        if emails.len() < selected.len() {
            warn!(
                "{} of {} messages could not be fetched",
                selected.len() - emails.len(),
                selected.len()
            );
        }

        Ok(MailboxListing {
            mailbox: request.mailbox.to_string(),
            total: ids.len(),
            emails,
        })
    }
}

impl std::fmt::Debug for MailReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailReader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
