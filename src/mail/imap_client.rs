use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};
use native_tls::TlsConnector;
use std::ops::{Deref, DerefMut};

use crate::auth::token_manager::TokenManager;
use crate::mail::raw::RawMessage;
use crate::mail::{MailSource, cutoff};

type TlsSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

/// The handful of IMAP operations the digest needs.
pub trait MailboxSession {
    fn select_inbox(&mut self) -> Result<()>;

    /// UIDs of messages received on or after `since`.
    fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>>;

    /// Full RFC 822 bytes, `None` if the server returned no body.
    fn fetch_rfc822(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;

    fn logout(&mut self) -> Result<()>;
}

/// Opens an authenticated session.
pub trait SessionOpener {
    type Session: MailboxSession;

    fn open(&self) -> Result<Self::Session>;
}

/// Logs the session out when dropped, whatever path the fetch took.
struct Released<S: MailboxSession>(S);

impl<S: MailboxSession> Deref for Released<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

impl<S: MailboxSession> DerefMut for Released<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.0
    }
}

impl<S: MailboxSession> Drop for Released<S> {
    fn drop(&mut self) {
        if let Err(e) = self.0.logout() {
            warn!("IMAP logout failed: {e}");
        }
    }
}

/// Keep the newest `cap` UIDs. UIDs grow with arrival order, so the tail of
/// the ascending list is the most recent mail.
pub fn most_recent(mut uids: Vec<u32>, cap: usize) -> Vec<u32> {
    uids.sort_unstable();
    uids.dedup();
    let start = uids.len().saturating_sub(cap);
    uids.split_off(start)
}

pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

pub struct ImapSource<O: SessionOpener> {
    opener: O,
}

impl<O: SessionOpener> ImapSource<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }

    fn collect(
        &self,
        session: &mut O::Session,
        since: NaiveDate,
        max_results: usize,
    ) -> Vec<RawMessage> {
        if let Err(e) = session.select_inbox() {
            error!("IMAP select INBOX failed: {e}");
            return Vec::new();
        }

        let uids = match session.search_since(since) {
            Ok(uids) => uids,
            Err(e) => {
                error!("Failed to search for emails: {e}");
                return Vec::new();
            }
        };
        if uids.is_empty() {
            info!("No emails found since {}", imap_date(since));
            return Vec::new();
        }

        let matched = uids.len();
        let uids = most_recent(uids, max_results);
        debug!("IMAP search matched {matched} messages, fetching {}", uids.len());

        let mut out = Vec::with_capacity(uids.len());
        for uid in uids {
            match session.fetch_rfc822(uid) {
                Ok(Some(bytes)) => out.push(RawMessage::Rfc822 {
                    id: uid.to_string(),
                    bytes,
                }),
                Ok(None) => warn!("UID {uid}: server returned no body; skipping"),
                Err(e) => error!("Error fetching email UID {uid}: {e}"),
            }
        }
        out
    }
}

impl<O: SessionOpener> MailSource for ImapSource<O> {
    fn name(&self) -> &'static str {
        "imap"
    }

    fn fetch(&self, lookback_hours: u32, max_results: usize) -> Result<Vec<RawMessage>> {
        let since = cutoff(Utc::now(), lookback_hours).date_naive();

        let session = match self.opener.open() {
            Ok(s) => s,
            Err(e) => {
                error!("Error in IMAP email fetching: {e}");
                return Ok(Vec::new());
            }
        };
        let mut session = Released(session);
        Ok(self.collect(&mut session, since, max_results))
    }
}

pub enum ImapAuth {
    /// Plain LOGIN with an app password.
    Password(String),
    /// SASL XOAUTH2 with an OAuth access token.
    XOAuth2(TokenManager),
}

/// Build canonical auth string as bytes.
fn build_xoauth2_bytes(user: &str, access_token: &str) -> Vec<u8> {
    format!("user={user}\x01auth=Bearer {access_token}\x01\x01").into_bytes()
}

struct OAuth2Authenticator {
    response: Vec<u8>,
}

impl imap::Authenticator for OAuth2Authenticator {
    type Response = Vec<u8>;
    fn process(&self, _challenge: &[u8]) -> Self::Response {
        self.response.clone()
    }
}

pub struct ImapClient {
    pub server: String,
    pub port: u16,
    pub user: String,
    auth: ImapAuth,
}

impl ImapClient {
    pub fn new(server: impl Into<String>, port: u16, user: impl Into<String>, auth: ImapAuth) -> Self {
        Self {
            server: server.into(),
            port,
            user: user.into(),
            auth,
        }
    }

    fn authenticate_xoauth2(
        &self,
        mut client: imap::Client<native_tls::TlsStream<std::net::TcpStream>>,
        access_token: &str,
    ) -> Result<TlsSession> {
        let raw_payload = build_xoauth2_bytes(&self.user, access_token);

        // Try RAW first
        let auth_raw = OAuth2Authenticator {
            response: raw_payload.clone(),
        };
        match client.authenticate("XOAUTH2", &auth_raw) {
            Ok(session) => return Ok(session),
            Err((e, returned_client)) => {
                debug!("XOAUTH2 with raw payload failed: {e}");
                client = returned_client;
            }
        }

        // Fallback BASE64
        let auth_b64 = OAuth2Authenticator {
            response: general_purpose::STANDARD.encode(&raw_payload).into_bytes(),
        };
        client
            .authenticate("XOAUTH2", &auth_b64)
            .map_err(|(e, _)| anyhow!("XOAUTH2 failed (raw+base64): {e}"))
    }
}

impl SessionOpener for ImapClient {
    type Session = ImapSession;

    fn open(&self) -> Result<ImapSession> {
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((self.server.as_str(), self.port), self.server.as_str(), &tls)?;
        debug!("Connected to {}:{}", self.server, self.port);

        let session = match &self.auth {
            ImapAuth::Password(password) => client
                .login(&self.user, password)
                .map_err(|(e, _)| anyhow!("IMAP login failed for {}: {e}", self.user))?,
            ImapAuth::XOAuth2(tokens) => {
                let access_token = tokens.access_token()?;
                self.authenticate_xoauth2(client, &access_token)?
            }
        };
        Ok(ImapSession(session))
    }
}

pub struct ImapSession(TlsSession);

impl MailboxSession for ImapSession {
    fn select_inbox(&mut self) -> Result<()> {
        let mailbox = self.0.select("INBOX")?;
        debug!("INBOX has {} messages", mailbox.exists);
        Ok(())
    }

    fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        let query = format!("SINCE {}", imap_date(since));
        Ok(self.0.uid_search(query)?.into_iter().collect())
    }

    fn fetch_rfc822(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        // PEEK keeps the \Seen flag untouched
        let fetches = self.0.uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")?;
        Ok(fetches.iter().next().and_then(|f| f.body()).map(<[u8]>::to_vec))
    }

    fn logout(&mut self) -> Result<()> {
        self.0.logout()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        opened: usize,
        logged_out: usize,
        fetched: Vec<u32>,
        searched_since: Option<NaiveDate>,
    }

    #[derive(Clone, Default)]
    struct FakeMailbox {
        uids: Vec<u32>,
        broken: HashSet<u32>,
        fail_select: bool,
        fail_search: bool,
        fail_open: bool,
        calls: Rc<RefCell<Calls>>,
    }

    struct FakeSession(FakeMailbox);

    impl MailboxSession for FakeSession {
        fn select_inbox(&mut self) -> Result<()> {
            if self.0.fail_select {
                return Err(anyhow!("NO [NONEXISTENT] mailbox"));
            }
            Ok(())
        }

        fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
            self.0.calls.borrow_mut().searched_since = Some(since);
            if self.0.fail_search {
                return Err(anyhow!("BAD search"));
            }
            // servers return UIDs in no particular order
            let mut uids = self.0.uids.clone();
            uids.reverse();
            Ok(uids)
        }

        fn fetch_rfc822(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
            if self.0.broken.contains(&uid) {
                return Err(anyhow!("connection reset"));
            }
            self.0.calls.borrow_mut().fetched.push(uid);
            Ok(Some(format!("Subject: message {uid}\r\n\r\nbody").into_bytes()))
        }

        fn logout(&mut self) -> Result<()> {
            self.0.calls.borrow_mut().logged_out += 1;
            Ok(())
        }
    }

    impl SessionOpener for FakeMailbox {
        type Session = FakeSession;

        fn open(&self) -> Result<FakeSession> {
            self.calls.borrow_mut().opened += 1;
            if self.fail_open {
                return Err(anyhow!("authentication failed"));
            }
            Ok(FakeSession(self.clone()))
        }
    }

    #[test]
    fn keeps_the_newest_uids_when_over_cap() {
        let uids: Vec<u32> = (1..=120).collect();
        let kept = most_recent(uids, 50);
        assert_eq!(kept.len(), 50);
        assert_eq!(kept.first(), Some(&71));
        assert_eq!(kept.last(), Some(&120));
    }

    #[test]
    fn under_cap_keeps_everything_sorted() {
        assert_eq!(most_recent(vec![9, 3, 5, 3], 10), vec![3, 5, 9]);
        assert!(most_recent(Vec::new(), 5).is_empty());
    }

    #[test]
    fn formats_search_date() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(imap_date(d), "07-Mar-2024");
    }

    #[test]
    fn fetches_most_recent_fifty_of_one_hundred_twenty() {
        let mailbox = FakeMailbox {
            uids: (1..=120).collect(),
            ..FakeMailbox::default()
        };
        let calls = mailbox.calls.clone();
        let source = ImapSource::new(mailbox);

        let raw = source.fetch(12, 50).unwrap();
        assert_eq!(raw.len(), 50);
        assert_eq!(raw.first().map(RawMessage::id), Some("71"));
        assert_eq!(raw.last().map(RawMessage::id), Some("120"));

        let calls = calls.borrow();
        assert_eq!(calls.fetched, (71..=120).collect::<Vec<_>>());
        assert_eq!(calls.logged_out, 1);
        assert!(calls.searched_since.is_some());
    }

    #[test]
    fn per_message_failures_are_skipped() {
        let mailbox = FakeMailbox {
            uids: vec![1, 2, 3],
            broken: HashSet::from([2]),
            ..FakeMailbox::default()
        };
        let source = ImapSource::new(mailbox);

        let ids: Vec<String> = source
            .fetch(24, 10)
            .unwrap()
            .iter()
            .map(|m| m.id().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn search_failure_is_empty_and_still_logs_out() {
        let mailbox = FakeMailbox {
            uids: vec![1, 2],
            fail_search: true,
            ..FakeMailbox::default()
        };
        let calls = mailbox.calls.clone();
        let source = ImapSource::new(mailbox);

        assert!(source.fetch(12, 50).unwrap().is_empty());
        assert_eq!(calls.borrow().logged_out, 1);
    }

    #[test]
    fn select_failure_is_empty_and_still_logs_out() {
        let mailbox = FakeMailbox {
            fail_select: true,
            ..FakeMailbox::default()
        };
        let calls = mailbox.calls.clone();
        let source = ImapSource::new(mailbox);

        assert!(source.fetch(12, 50).unwrap().is_empty());
        assert_eq!(calls.borrow().logged_out, 1);
    }

    #[test]
    fn auth_failure_is_empty() {
        let mailbox = FakeMailbox {
            fail_open: true,
            ..FakeMailbox::default()
        };
        let calls = mailbox.calls.clone();
        let source = ImapSource::new(mailbox);

        assert!(source.fetch(12, 50).unwrap().is_empty());
        assert_eq!(calls.borrow().opened, 1);
        assert_eq!(calls.borrow().logged_out, 0);
    }

    #[test]
    fn xoauth2_payload_layout() {
        let bytes = build_xoauth2_bytes("me@example.com", "tok");
        assert_eq!(bytes, b"user=me@example.com\x01auth=Bearer tok\x01\x01".to_vec());
    }
}
