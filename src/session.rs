//! IMAP session state machine
//!
//! A [`Session`] owns one stream and walks it through
//! `Disconnected -> Connected -> Authenticated -> Selected -> LoggedOut`.
//! Exactly one command is in flight at a time: every command takes
//! `&mut self`, and a command whose tagged completion was never read
//! (timeout, I/O failure, or a cancelled future) poisons the session so
//! no further command can be written on a desynchronised stream.
//!
//! The session is generic over the stream so the same engine runs over
//! TLS in production and over in-memory pipes in tests.

use crate::command::{Command, Tag, TagGenerator};
use crate::error::{Error, Result};
use crate::response::{
    Frame, LineBuffer, MailboxStatus, Response, ResponseLine, is_bye, parse_fetch, parse_search,
    parse_select,
};
use crate::search::{IdMode, SearchScope};
use crate::summary::MessageSummary;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Upper bound on the socket shutdown performed by [`Session::close`].
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    Selected,
    LoggedOut,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Selected => "selected",
            Self::LoggedOut => "logged out",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read deadline together with the budget it was derived from.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn expired(self, context: impl Into<String>) -> Error {
        Error::Timeout {
            seconds: self.budget.as_secs_f64(),
            context: context.into(),
        }
    }
}

/// One IMAP connection, owned by a single caller.
pub struct Session<S> {
    stream: S,
    state: SessionState,
    tags: TagGenerator,
    buffer: LineBuffer,
    command_timeout: Duration,
    id_mode: IdMode,
    outstanding: Option<Tag>,
    closed: bool,
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("id_mode", &self.id_mode)
            .field("outstanding", &self.outstanding)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Consume the server greeting on a freshly opened stream.
    ///
    /// `* OK` leaves the session Connected, `* PREAUTH` Authenticated.
    /// On any failure the stream is shut down before the error returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] on `* BYE` or EOF, and
    /// [`Error::Timeout`] if no greeting arrives in time.
    pub async fn establish(
        stream: S,
        greeting_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self> {
        let mut session = Self {
            stream,
            state: SessionState::Disconnected,
            tags: TagGenerator::new(),
            buffer: LineBuffer::new(),
            command_timeout,
            id_mode: IdMode::default(),
            outstanding: None,
            closed: false,
        };

        match session.read_greeting(Deadline::after(greeting_timeout)).await {
            Ok(state) => {
                session.state = state;
                debug!("Greeting received, session {}", state);
                Ok(session)
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a command was issued without its completion being read.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.outstanding.is_some()
    }

    #[must_use]
    pub const fn id_mode(&self) -> IdMode {
        self.id_mode
    }

    /// Choose between sequence numbers and UIDs for SEARCH and FETCH.
    pub const fn set_id_mode(&mut self, mode: IdMode) {
        self.id_mode = mode;
    }

    /// LOGIN. Rejected credentials are reported once and never retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when the server refuses the credentials.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.require("LOGIN", &[SessionState::Connected])?;
        let command = Command::login(username, password)?;

        let response = self.execute(&command).await?;
        if !response.completion.is_ok() {
            return Err(Error::Auth(response.completion.summary()));
        }

        self.state = SessionState::Authenticated;
        info!("Authenticated to IMAP server");
        Ok(())
    }

    /// SELECT a mailbox. A rejected SELECT leaves no mailbox selected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mailbox`] when the server refuses the mailbox.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.require(
            "SELECT",
            &[SessionState::Authenticated, SessionState::Selected],
        )?;
        let command = Command::select(mailbox)?;

        let response = self.execute(&command).await?;
        if !response.completion.is_ok() {
            self.state = SessionState::Authenticated;
            return Err(Error::Mailbox(format!(
                "SELECT {mailbox} rejected: {}",
                response.completion.summary()
            )));
        }

        self.state = SessionState::Selected;
        let status = parse_select(&response.untagged);
        info!(
            "Selected {} ({} messages)",
            mailbox,
            status.exists.map_or_else(|| "?".to_string(), |n| n.to_string())
        );
        Ok(status)
    }

    /// SEARCH the selected mailbox; identifiers come back in server order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the server refuses the criteria.
    pub async fn search(&mut self, scope: &SearchScope) -> Result<Vec<u32>> {
        self.require("SEARCH", &[SessionState::Selected])?;
        let command = Command::search(self.id_mode, scope)?;

        let response = self.execute(&command).await?;
        if !response.completion.is_ok() {
            return Err(Error::Protocol(format!(
                "SEARCH {scope} rejected: {}",
                response.completion.summary()
            )));
        }

        let ids = parse_search(&response.untagged)?;
        debug!("SEARCH {} matched {} messages", scope, ids.len());
        Ok(ids)
    }

    /// FETCH the summary header fields of one message.
    ///
    /// Server refusals and unusable FETCH data come back as
    /// [`Error::Fetch`]; transport failures keep their own variants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] for a refused or unusable message.
    pub async fn fetch_summary(&mut self, id: u32) -> Result<MessageSummary> {
        self.require("FETCH", &[SessionState::Selected])?;
        let command = Command::fetch_headers(self.id_mode, id);

        let response = self.execute(&command).await?;
        if !response.completion.is_ok() {
            return Err(Error::Fetch {
                id,
                reason: response.completion.summary(),
            });
        }

        let mut malformed = None;
        for line in &response.untagged {
            match parse_fetch(line) {
                Some(Ok(item)) => {
                    let matches = match self.id_mode {
                        IdMode::Sequence => item.seq == id,
                        IdMode::Uid => item.uid == Some(id),
                    };
                    if matches && let Some(header) = item.header {
                        return Ok(MessageSummary::from_header_block(id, &header));
                    }
                }
                Some(Err(e)) => malformed = Some(e.to_string()),
                None => {}
            }
        }

        Err(Error::Fetch {
            id,
            reason: malformed.unwrap_or_else(|| "no header data returned".to_string()),
        })
    }

    /// FETCH summaries for `ids`, skipping messages that fail
    /// individually. Order follows `ids`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; see [`Error::is_fatal`].
    pub async fn fetch_summaries(&mut self, ids: &[u32]) -> Result<Vec<MessageSummary>> {
        let mut summaries = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.fetch_summary(id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) if !e.is_fatal() => warn!("Skipping message {}: {}", id, e),
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    /// LOGOUT, best-effort: failures are logged, never returned.
    ///
    /// Skipped when the stream is already desynchronised.
    pub async fn logout(&mut self) {
        if self.closed
            || matches!(
                self.state,
                SessionState::Disconnected | SessionState::LoggedOut
            )
        {
            return;
        }
        if let Some(tag) = &self.outstanding {
            debug!("Skipping LOGOUT, {} never completed", tag);
            return;
        }

        match self.execute(&Command::Logout).await {
            Ok(response) if response.completion.is_ok() => debug!("Logged out"),
            Ok(response) => warn!("LOGOUT refused: {}", response.completion.summary()),
            Err(e) => warn!("LOGOUT failed: {}", e),
        }
        self.state = SessionState::LoggedOut;
    }

    /// Log out if possible and shut the stream down. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.logout().await;

        match tokio::time::timeout(SHUTDOWN_GRACE, self.stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Stream shutdown failed: {}", e),
            Err(_) => debug!("Stream shutdown timed out"),
        }

        self.closed = true;
        if self.state != SessionState::LoggedOut {
            self.state = SessionState::Disconnected;
        }
        debug!("Session closed");
    }

    /// Send one command and read until its tagged completion.
    async fn execute(&mut self, command: &Command) -> Result<Response> {
        if self.closed {
            return Err(Error::InvalidState {
                command: command.name(),
                state: "closed",
            });
        }
        if let Some(tag) = &self.outstanding {
            return Err(Error::Protocol(format!(
                "{tag} never completed; refusing to send {}",
                command.name()
            )));
        }

        let tag = self.tags.next_tag();
        let deadline = Deadline::after(self.command_timeout);
        debug!("C: {}", command.redacted(&tag));

        self.outstanding = Some(tag.clone());
        let line = command.render(&tag);
        timeout_at(deadline.at, async {
            self.stream.write_all(line.as_bytes()).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| deadline.expired(format!("writing {}", command.name())))??;

        let response = self.read_response(&tag, deadline, command.name()).await?;
        self.outstanding = None;
        Ok(response)
    }

    async fn read_response(
        &mut self,
        tag: &Tag,
        deadline: Deadline,
        name: &'static str,
    ) -> Result<Response> {
        let mut untagged = Vec::new();
        loop {
            let line = self.read_line(deadline, name).await?;
            match Frame::classify(line)? {
                Frame::Untagged(line) => {
                    if is_bye(&line) {
                        debug!("S: {}", line.text);
                    }
                    untagged.push(line);
                }
                Frame::Continuation(text) => {
                    return Err(Error::Protocol(format!(
                        "unexpected continuation request during {name}: {text}"
                    )));
                }
                Frame::Tagged(completion) if completion.tag == tag.as_str() => {
                    debug!("S: {}", completion.summary());
                    return Ok(Response {
                        untagged,
                        completion,
                    });
                }
                Frame::Tagged(stray) => {
                    warn!(
                        "Discarding completion for {} while waiting on {}",
                        stray.tag, tag
                    );
                }
            }
        }
    }

    async fn read_greeting(&mut self, deadline: Deadline) -> Result<SessionState> {
        let line = self.read_line(deadline, "server greeting").await?;
        let text = line.text.clone();
        let Frame::Untagged(_) = Frame::classify(line)? else {
            return Err(Error::Protocol(format!("expected greeting, got '{text}'")));
        };

        let body = text.trim_start_matches('*').trim_start();
        let word = body.split_ascii_whitespace().next().unwrap_or_default();
        match word.to_ascii_uppercase().as_str() {
            "OK" => Ok(SessionState::Connected),
            "PREAUTH" => Ok(SessionState::Authenticated),
            "BYE" => Err(Error::Connection(format!("server refused session: {body}"))),
            _ => Err(Error::Protocol(format!("unrecognised greeting '{text}'"))),
        }
    }

    async fn read_line(&mut self, deadline: Deadline, context: &str) -> Result<ResponseLine> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.buffer.next_line()? {
                return Ok(line);
            }
            let read = timeout_at(deadline.at, self.stream.read(&mut chunk))
                .await
                .map_err(|_| deadline.expired(format!("waiting for {context}")))??;
            if read == 0 {
                return Err(Error::Connection(format!(
                    "server closed the connection while waiting for {context}"
                )));
            }
            self.buffer.extend(&chunk[..read]);
        }
    }

    fn require(&self, command: &'static str, allowed: &[SessionState]) -> Result<()> {
        if self.closed || !allowed.contains(&self.state) {
            return Err(Error::InvalidState {
                command,
                state: if self.closed {
                    "closed"
                } else {
                    self.state.as_str()
                },
            });
        }
        Ok(())
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        if !self.closed {
            debug!("Session dropped without close; releasing the stream");
        }
    }
}
