#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for listing recent mailbox messages over IMAP (read-only)

use clap::{Parser, Subcommand};
use imap_mailbox_reader::{
    Error, Folder, IdMode, ImapConfig, ListRequest, MailReader, MailboxListing, SearchScope,
    SliceFrom,
};
use serde_json::json;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mail-cli")]
#[command(about = "Read-only CLI listing recent messages from an IMAP mailbox")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the most recent messages
    Recent {
        /// Mailbox to list (e.g. INBOX, sent, "[Gmail]/All Mail")
        #[arg(long)]
        mailbox: Option<String>,

        /// Maximum number of messages to fetch
        #[arg(long)]
        limit: Option<usize>,

        /// Only unseen messages
        #[arg(long, conflicts_with = "criteria")]
        unseen: bool,

        /// Raw IMAP search criteria (e.g. 'FROM "client@example.com"')
        #[arg(long)]
        criteria: Option<String>,

        /// Take the oldest matches instead of the most recent
        #[arg(long)]
        head: bool,

        /// Identify messages by UID instead of sequence number
        #[arg(long)]
        uid: bool,
    },

    /// Report whether IMAP credentials are configured
    Status {
        /// Also connect and log in to validate the credentials
        #[arg(long)]
        probe: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Recent {
            mailbox,
            limit,
            unseen,
            criteria,
            head,
            uid,
        } => {
            let reader = MailReader::new(ImapConfig::from_env()?)?;
            let mut request = ListRequest::from_config(reader.config());
            if let Some(mailbox) = mailbox {
                request.mailbox = Folder::from(mailbox.as_str());
            }
            if let Some(limit) = limit {
                request.limit = *limit;
            }
            if *unseen {
                request.scope = SearchScope::Unseen;
            } else if let Some(criteria) = criteria {
                request.scope = SearchScope::from(criteria.as_str());
            }
            if *head {
                request.slice = SliceFrom::Head;
            }
            if *uid {
                request.id_mode = IdMode::Uid;
            }

            cmd_recent(&reader, &args, &request).await
        }
        Command::Status { probe } => cmd_status(&args, *probe).await,
    }
}

async fn cmd_recent(
    reader: &MailReader,
    args: &Args,
    request: &ListRequest,
) -> anyhow::Result<ExitCode> {
    match reader.list(request).await {
        Ok(listing) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_listing(&listing);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => report_failure(reader, args, &e),
    }
}

async fn cmd_status(args: &Args, probe: bool) -> anyhow::Result<ExitCode> {
    let configured = ImapConfig::is_configured();

    if !probe || !configured {
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "configured": configured,
                    "method": "IMAP",
                }))?
            );
        } else if configured {
            println!("IMAP credentials configured");
        } else {
            println!("IMAP credentials not configured (set GMAIL_IMAP_USER and GMAIL_IMAP_PASS)");
        }
        return Ok(if configured {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let reader = MailReader::new(ImapConfig::from_env()?)?;
    match reader.verify_login().await {
        Ok(()) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "configured": true,
                        "method": "IMAP",
                        "authenticated": true,
                        "host": reader.config().host,
                    }))?
                );
            } else {
                println!("Logged in to {} successfully", reader.config().host);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => report_failure(&reader, args, &e),
    }
}

fn report_failure(reader: &MailReader, args: &Args, error: &Error) -> anyhow::Result<ExitCode> {
    let report = error.report(reader.credential_hint());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!("Error: {} ({})", report.error, report.hint);
    }
    Ok(ExitCode::FAILURE)
}

fn print_listing(listing: &MailboxListing) {
    if listing.emails.is_empty() {
        println!("No messages found in {}.", listing.mailbox);
        return;
    }

    let header = format!("{:<8} {:<26} {:<30} {}", "ID", "Date", "From", "Subject");
    println!("{header}");
    println!("{}", "-".repeat(100));

    for email in &listing.emails {
        println!(
            "{:<8} {:<26} {:<30} {}",
            email.id,
            truncate(&email.date, 25),
            truncate(&email.from, 28),
            truncate(&email.subject, 40),
        );
    }

    println!(
        "\n{} of {} message(s) in {}",
        listing.emails.len(),
        listing.total,
        listing.mailbox
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
