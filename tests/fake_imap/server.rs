//! In-process fake IMAP server for integration testing
//!
//! # How the conversation goes
//!
//! Gmail serves IMAP on port 993 with **implicit TLS**: the TLS
//! handshake happens as soon as TCP connects, and the greeting is the
//! first thing sent inside the encrypted stream.
//!
//! ```text
//!   Client connects via TCP
//!       |
//!   TLS handshake
//!       |
//!   Server sends greeting: "* OK Gimap ready\r\n"
//!       |
//!   A1 LOGIN "user" "app password"
//!   A2 SELECT "INBOX"
//!   A3 SEARCH ALL            (or UID SEARCH)
//!   A4 FETCH 7 (BODY.PEEK[HEADER.FIELDS (SUBJECT FROM DATE)])
//!   ...
//!   An LOGOUT
//! ```
//!
//! Every command starts with a tag chosen by the client; the server
//! echoes it in the completion (`A2 OK ...`) after any untagged `*`
//! data lines.
//!
//! # Misbehaving on purpose
//!
//! [`Behavior`] makes the server fail the way real servers do:
//! rejecting LOGIN, answering slowly, never answering a command, or
//! sending a completion for a tag the client is not waiting on.

use super::handlers::{handle_fetch, handle_login, handle_logout, handle_search, handle_select};
use super::io::write_line;
use super::mailbox::Mailbox;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A command the server reads but never answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    Select,
    Search,
    Fetch,
}

/// Knobs for making the server misbehave.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Answer every LOGIN with `NO [AUTHENTICATIONFAILED]`.
    pub reject_login: bool,
    /// Swallow this command without responding.
    pub stall: Option<Stall>,
    /// Send a completion for an unknown tag before each real response.
    pub stray_tags: bool,
    /// Wait this long before answering each command.
    pub delay: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicUsize,
    logins: AtomicUsize,
    logouts: AtomicUsize,
}

/// A fake IMAP server that runs on localhost with an OS-assigned port.
///
/// The server generates a self-signed TLS certificate at startup using
/// `rcgen`, so clients must connect with certificate verification
/// disabled.
pub struct FakeImapServer {
    port: u16,
    counters: Arc<Counters>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Start a well-behaved server with the given mailbox state.
    pub async fn start(mailbox: Mailbox) -> Self {
        Self::start_with(mailbox, Behavior::default()).await
    }

    /// Start a server that misbehaves as described by `behavior`.
    pub async fn start_with(mailbox: Mailbox, behavior: Behavior) -> Self {
        // Several tests may race to install the provider; losing is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let mailbox = Arc::new(mailbox);
        let behavior = Arc::new(behavior);
        let counters = Arc::new(Counters::default());

        let shared = counters.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                shared.connections.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let mailbox = mailbox.clone();
                let behavior = behavior.clone();
                let counters = shared.clone();
                tokio::spawn(async move {
                    let Ok(tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    handle_imap_session(tls, &mailbox, &behavior, &counters).await;
                });
            }
        });

        Self {
            port,
            counters,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    /// LOGIN commands received so far.
    pub fn login_attempts(&self) -> usize {
        self.counters.logins.load(Ordering::SeqCst)
    }

    /// LOGOUT commands received so far.
    pub fn logouts(&self) -> usize {
        self.counters.logouts.load(Ordering::SeqCst)
    }
}

impl Drop for FakeImapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Run the IMAP command loop over an established TLS stream.
///
/// Each line is parsed with imap-codec's `CommandCodec` and dispatched
/// on its `CommandBody`. The client never sends literals, so one line
/// is always one command.
async fn handle_imap_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    mailbox: &Mailbox,
    behavior: &Behavior,
    counters: &Counters,
) {
    let mut reader = BufReader::new(stream);
    let mut selected_folder: Option<String> = None;
    let codec = CommandCodec::default();

    if write_line(&mut reader, "* OK Gimap ready for requests from 127.0.0.1\r\n")
        .await
        .is_err()
    {
        return;
    }

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = trimmed.split_whitespace().next().unwrap_or("*");
            let resp = format!("{tag} BAD Could not parse command\r\n");
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        };
        let tag = command.tag.inner();

        let stalled = match &command.body {
            CommandBody::Select { .. } => Some(Stall::Select),
            CommandBody::Search { .. } => Some(Stall::Search),
            CommandBody::Fetch { .. } => Some(Stall::Fetch),
            _ => None,
        };
        if stalled.is_some() && stalled == behavior.stall {
            // Keep reading so the client's shutdown is observed, but
            // never answer anything again.
            drain(&mut reader).await;
            return;
        }

        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }
        if behavior.stray_tags
            && write_line(&mut reader, "Z999 OK stale completion\r\n")
                .await
                .is_err()
        {
            break;
        }

        match command.body {
            CommandBody::Login { .. } => {
                counters.logins.fetch_add(1, Ordering::SeqCst);
                handle_login(tag, behavior.reject_login, &mut reader).await;
            }
            CommandBody::Select { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                selected_folder = handle_select(tag, &name, mailbox, &mut reader).await;
            }
            CommandBody::Search { criteria, uid, .. } => {
                handle_search(
                    tag,
                    criteria.as_ref(),
                    uid,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Fetch {
                sequence_set, uid, ..
            } => {
                handle_fetch(
                    tag,
                    &sequence_set,
                    uid,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Logout => {
                counters.logouts.fetch_add(1, Ordering::SeqCst);
                handle_logout(tag, &mut reader).await;
                break;
            }
            _ => {
                let resp = format!("{tag} BAD Unsupported command\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn drain<S: AsyncRead + AsyncWrite + Unpin>(reader: &mut BufReader<S>) {
    let mut sink = String::new();
    while matches!(reader.read_line(&mut sink).await, Ok(n) if n > 0) {
        sink.clear();
    }
}
