//! LOGIN command handler.
//!
//! Credentials travel in the clear inside the TLS stream. The fake
//! server accepts any username and password unless it was told to
//! reject them, in which case it answers the way Gmail does for a bad
//! app password.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LOGIN command. Returns whether the login succeeded.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    reject: bool,
    stream: &mut BufReader<S>,
) -> bool {
    let resp = if reject {
        format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n")
    } else {
        format!("{tag} OK LOGIN completed\r\n")
    };
    let _ = write_line(stream, &resp).await;
    !reject
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::written;

    async fn run(tag: &str, reject: bool) -> (String, bool) {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        let ok = handle_login(tag, reject, &mut stream).await;
        drop(stream);

        (written(client).await, ok)
    }

    #[tokio::test]
    async fn responds_with_ok() {
        let (output, ok) = run("A1", false).await;
        assert!(ok);
        assert_eq!(output, "A1 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn rejects_with_authenticationfailed() {
        let (output, ok) = run("A1", true).await;
        assert!(!ok);
        assert!(output.starts_with("A1 NO [AUTHENTICATIONFAILED]"));
    }

    #[tokio::test]
    async fn echoes_client_tag() {
        let (output, _) = run("TAG42", false).await;
        assert!(output.starts_with("TAG42 "));
    }
}
