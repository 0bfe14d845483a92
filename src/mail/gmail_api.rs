use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::time::Duration;

use crate::auth::token_manager::TokenManager;
use crate::mail::raw::{ApiMessage, RawMessage};
use crate::mail::{MailSource, cutoff};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
/// Server-side ceiling for `maxResults` on `messages.list`.
const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// The two Gmail REST calls the digest makes.
pub trait GmailTransport {
    fn list_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListPage>;

    fn get_message(&self, id: &str) -> Result<ApiMessage>;
}

pub fn after_query(cutoff_epoch: i64) -> String {
    format!("after:{cutoff_epoch}")
}

pub struct GmailApiSource<T: GmailTransport> {
    transport: T,
}

impl<T: GmailTransport> GmailApiSource<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// A failed first page is an error. A later failed page ends the
    /// listing with the ids gathered so far.
    fn list_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < max_results {
            let page_size = (max_results - ids.len()).min(MAX_PAGE_SIZE);
            let page = match self
                .transport
                .list_page(query, page_size, page_token.as_deref())
            {
                Ok(page) => page,
                Err(e) if page_token.is_some() => {
                    warn!("Listing stopped after {} ids: {e:#}", ids.len());
                    break;
                }
                Err(e) => return Err(e),
            };
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(max_results);
        Ok(ids)
    }
}

impl<T: GmailTransport> MailSource for GmailApiSource<T> {
    fn name(&self) -> &'static str {
        "gmail_api"
    }

    fn fetch(&self, lookback_hours: u32, max_results: usize) -> Result<Vec<RawMessage>> {
        let query = after_query(cutoff(Utc::now(), lookback_hours).timestamp());

        let ids = match self.list_ids(&query, max_results) {
            Ok(ids) => ids,
            Err(e) => {
                error!("Error fetching emails: {e:#}");
                return Ok(Vec::new());
            }
        };
        if ids.is_empty() {
            info!("No emails found for query {query}");
            return Ok(Vec::new());
        }
        debug!("Gmail query {query} listed {} messages", ids.len());

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.transport.get_message(&id) {
                Ok(msg) => out.push(RawMessage::Api(msg)),
                Err(e) => error!("Error processing email {id}: {e:#}"),
            }
        }
        Ok(out)
    }
}

pub struct HttpGmailTransport {
    http: reqwest::blocking::Client,
    tokens: TokenManager,
    base_url: String,
}

impl HttpGmailTransport {
    pub fn new(tokens: TokenManager) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            tokens,
            base_url: GMAIL_API_BASE.to_string(),
        })
    }
}

impl GmailTransport for HttpGmailTransport {
    fn list_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListPage> {
        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let page = self
            .http
            .get(format!("{}/users/me/messages", self.base_url))
            .bearer_auth(self.tokens.access_token()?)
            .query(&params)
            .send()?
            .error_for_status()
            .context("messages.list")?
            .json()?;
        Ok(page)
    }

    fn get_message(&self, id: &str) -> Result<ApiMessage> {
        let msg = self
            .http
            .get(format!("{}/users/me/messages/{id}", self.base_url))
            .bearer_auth(self.tokens.access_token()?)
            .query(&[("format", "full")])
            .send()?
            .error_for_status()
            .with_context(|| format!("messages.get {id}"))?
            .json()?;
        Ok(msg)
    }
}
