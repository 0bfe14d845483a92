pub mod decoders;
pub mod gmail_api;
pub mod imap_client;
pub mod normalize;
pub mod raw;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::auth::token_manager::{GMAIL_READONLY_SCOPE, IMAP_SCOPE, TokenManager};
use crate::config::{Config, MailboxStrategy};
use crate::mail::gmail_api::{GmailApiSource, HttpGmailTransport};
use crate::mail::imap_client::{ImapAuth, ImapClient, ImapSource};

pub use raw::RawMessage;

/// "Fetch messages newer than now − lookback, capped at N."
///
/// Implementations swallow batch failures (connect, auth, search) into an
/// empty result after logging them, and skip individual messages that fail.
/// An `Err` means something unexpected happened.
pub trait MailSource {
    fn name(&self) -> &'static str;

    fn fetch(&self, lookback_hours: u32, max_results: usize) -> Result<Vec<RawMessage>>;
}

pub fn cutoff(now: DateTime<Utc>, lookback_hours: u32) -> DateTime<Utc> {
    now - Duration::hours(i64::from(lookback_hours))
}

/// Pick the mailbox strategy named in the config.
pub fn source_from_config(cfg: &Config) -> Result<Box<dyn MailSource>> {
    match cfg.mailbox.strategy {
        MailboxStrategy::Imap => {
            let auth = match cfg.app_password() {
                Some(password) => ImapAuth::Password(password),
                None => ImapAuth::XOAuth2(TokenManager::from_config(cfg, IMAP_SCOPE)?),
            };
            let client = ImapClient::new(
                cfg.mailbox.imap_server.clone(),
                cfg.mailbox.imap_port,
                cfg.mailbox.user_email.clone(),
                auth,
            );
            Ok(Box::new(ImapSource::new(client)))
        }
        MailboxStrategy::GmailApi => {
            let tokens = TokenManager::from_config(cfg, GMAIL_READONLY_SCOPE)?;
            let transport = HttpGmailTransport::new(tokens)?;
            Ok(Box::new(GmailApiSource::new(transport)))
        }
    }
}
