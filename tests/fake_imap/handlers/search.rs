//! SEARCH and UID SEARCH command handler.
//!
//! Matches emails against the `SearchKey` criteria parsed by
//! imap-codec. Supported keys:
//!
//! - `All`, `Unseen`, `Seen`
//! - `Since(date)` / `Before(date)` against the `Date:` header
//! - `And`, `Or`, `Not`
//!
//! Plain SEARCH answers with sequence numbers, UID SEARCH with UIDs,
//! both in ascending order (RFC 3501 Section 7.2.5):
//!
//! ```text
//! * SEARCH 1 2 3
//! A3 OK SEARCH completed
//! ```

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::{Mailbox, TestEmail};
use chrono::NaiveDate;
use imap_codec::imap_types::search::SearchKey;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    criteria: &[SearchKey<'_>],
    uid: bool,
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder) = selected_folder.and_then(|name| mailbox.get_folder(name)) else {
        let resp = format!("{tag} BAD No mailbox selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let ids: Vec<String> = folder
        .emails
        .iter()
        .zip(1u32..)
        .filter(|(e, _)| criteria.iter().all(|key| matches_key(e, key)))
        .map(|(e, seq)| (if uid { e.uid } else { seq }).to_string())
        .collect();

    let mut line = String::from("* SEARCH");
    for id in &ids {
        line.push(' ');
        line.push_str(id);
    }
    line.push_str("\r\n");
    if write_line(stream, &line).await.is_err() {
        return;
    }
    let resp = format!("{tag} OK SEARCH completed (Success)\r\n");
    let _ = write_line(stream, &resp).await;
}

#[allow(clippy::match_same_arms)]
fn matches_key(email: &TestEmail, key: &SearchKey<'_>) -> bool {
    match key {
        SearchKey::All => true,
        SearchKey::Unseen => !email.seen,
        SearchKey::Seen => email.seen,
        SearchKey::Since(date) => email_date(&email.raw).is_some_and(|d| d >= *date.as_ref()),
        SearchKey::Before(date) => email_date(&email.raw).is_some_and(|d| d < *date.as_ref()),
        SearchKey::And(keys) => keys.as_ref().iter().all(|k| matches_key(email, k)),
        SearchKey::Or(a, b) => matches_key(email, a) || matches_key(email, b),
        SearchKey::Not(k) => !matches_key(email, k),
        _ => true,
    }
}

/// Calendar date of the `Date:` header, if it parses.
fn email_date(raw: &[u8]) -> Option<NaiveDate> {
    let text = std::str::from_utf8(raw).ok()?;
    let value = text
        .lines()
        .take_while(|line| !line.trim().is_empty())
        .find_map(|line| line.strip_prefix("Date:"))?;
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::written;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use imap_codec::imap_types::datetime::NaiveDate as ImapDate;

    fn dated(date: &str) -> Vec<u8> {
        format!("From: a@b.com\r\nDate: {date}\r\nSubject: Test\r\n\r\nBody").into_bytes()
    }

    async fn run(criteria: &[SearchKey<'_>], uid: bool, mailbox: &Mailbox) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        handle_search("A3", criteria, uid, mailbox, Some("INBOX"), &mut stream).await;
        drop(stream);

        written(client).await
    }

    fn sample() -> Mailbox {
        let raw = dated("Mon, 01 Jan 2024 10:00:00 +0000");
        MailboxBuilder::new()
            .folder("INBOX")
            .email(40, true, &raw)
            .email(41, false, &raw)
            .email(45, false, &raw)
            .build()
    }

    #[tokio::test]
    async fn plain_search_returns_sequence_numbers() {
        let output = run(&[SearchKey::All], false, &sample()).await;
        assert!(output.starts_with("* SEARCH 1 2 3\r\n"));
        assert!(output.ends_with("A3 OK SEARCH completed (Success)\r\n"));
    }

    #[tokio::test]
    async fn uid_search_returns_uids() {
        let output = run(&[SearchKey::All], true, &sample()).await;
        assert!(output.starts_with("* SEARCH 40 41 45\r\n"));
    }

    #[tokio::test]
    async fn unseen_filters_seen() {
        let output = run(&[SearchKey::Unseen], false, &sample()).await;
        assert!(output.starts_with("* SEARCH 2 3\r\n"));
    }

    #[tokio::test]
    async fn empty_result_is_a_bare_search_line() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let output = run(&[SearchKey::All], false, &mailbox).await;
        assert!(output.starts_with("* SEARCH\r\n"));
    }

    #[tokio::test]
    async fn since_compares_header_dates() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, true, &dated("Mon, 01 Jan 2024 10:00:00 +0000"))
            .email(2, true, &dated("Mon, 15 Jan 2024 10:00:00 +0000"))
            .build();
        let since = ImapDate::unvalidated(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());

        let output = run(&[SearchKey::Since(since)], true, &mailbox).await;
        assert!(output.starts_with("* SEARCH 2\r\n"));
    }

    #[tokio::test]
    async fn nothing_selected_is_bad() {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);
        handle_search("A3", &[SearchKey::All], false, &sample(), None, &mut stream).await;
        drop(stream);

        assert!(written(client).await.starts_with("A3 BAD"));
    }
}
