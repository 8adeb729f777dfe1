//! TLS transport
//!
//! Builds the rustls connector for a [`TlsMode`] and opens implicit-TLS
//! IMAP sessions (port 993 style: the handshake happens before the
//! greeting).

use crate::config::{ImapConfig, TlsMode};
use crate::error::{Error, Result};
use crate::session::Session;
use rustls::RootCertStore;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

/// A session over a TLS-wrapped TCP stream.
pub type ImapSession = Session<TlsStream<TcpStream>>;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a TLS connector for the given trust mode.
///
/// The ring provider is selected explicitly so no process-wide default
/// has to be installed.
///
/// # Errors
///
/// Returns [`Error::Tls`] if the CA file is unreadable or holds no
/// usable certificate.
pub fn tls_connector(mode: &TlsMode) -> Result<TlsConnector> {
    let provider = provider();
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("Unsupported protocol versions: {e}")))?;

    let config = match mode {
        TlsMode::WebPki => {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsMode::CustomCa(path) => builder
            .with_root_certificates(load_roots(path)?)
            .with_no_client_auth(),
        TlsMode::Insecure => {
            warn!("TLS certificate verification disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate {
                    algorithms: provider.signature_verification_algorithms,
                }))
                .with_no_client_auth()
        }
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Load every certificate in a PEM file into a root store.
fn load_roots(path: &Path) -> Result<RootCertStore> {
    debug!("Loading CA certificates from {}", path.display());
    let file = File::open(path).map_err(|e| {
        Error::Tls(format!(
            "Failed to read CA certificate at {}: {e}",
            path.display()
        ))
    })?;

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert.map_err(|e| Error::Tls(format!("Failed to parse CA certificate: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("Rejected CA certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(Error::Tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(roots)
}

/// Open a TLS connection and consume the server greeting.
///
/// TCP connect, TLS handshake and greeting share `connect_timeout`.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the server cannot be reached, the
/// handshake fails or does not finish within the budget, or the server
/// refuses the session. A greeting that never arrives is
/// [`Error::Timeout`].
pub async fn connect(config: &ImapConfig, connector: &TlsConnector) -> Result<ImapSession> {
    let addr = format!("{}:{}", config.host, config.port);
    let budget = config.connect_timeout;
    let deadline = Instant::now() + budget;
    let timed_out = |stage: &str| {
        Error::Connection(format!(
            "{stage} with {addr} timed out after {:.1}s",
            budget.as_secs_f64()
        ))
    };
    debug!("Connecting to IMAP server at {}", addr);

    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

    let tcp_stream = timeout_at(deadline, TcpStream::connect(&addr))
        .await
        .map_err(|_| timed_out("TCP connect"))?
        .map_err(|e| Error::Connection(format!("TCP connection to {addr} failed: {e}")))?;

    let tls_stream = timeout_at(deadline, connector.connect(server_name, tcp_stream))
        .await
        .map_err(|_| timed_out("TLS handshake"))?
        .map_err(|e| Error::Connection(format!("TLS handshake with {addr} failed: {e}")))?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    let session = Session::establish(tls_stream, remaining, config.command_timeout).await?;

    info!("Connected to IMAP server at {}", addr);
    Ok(session)
}

/// Certificate verifier that accepts any server certificate while
/// still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
