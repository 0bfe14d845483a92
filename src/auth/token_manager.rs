use anyhow::{Result, anyhow};
use chrono::Utc;
use log::{info, warn};

use crate::auth::token_cache::{CachedToken, TokenCache};
use crate::auth::{oauth, token_store};
use crate::config::{Config, config_dir};

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const IMAP_SCOPE: &str = "https://mail.google.com/";

/// Used when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3500;

#[derive(Clone)]
pub struct TokenManager {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub user_email: String,
    pub scope: String,
    cache: TokenCache,
}

impl TokenManager {
    pub fn from_config(cfg: &Config, scope: &str) -> Result<Self> {
        let client_id = cfg
            .mailbox
            .client_id
            .clone()
            .ok_or_else(|| anyhow!("mailbox.client_id not set in config"))?;

        let client_secret = token_store::load_client_secret(&client_id)?
            .or_else(|| std::env::var("OAUTH_CLIENT_SECRET").ok());

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: cfg.redirect_uri(),
            user_email: cfg.mailbox.user_email.clone(),
            scope: scope.to_string(),
            cache: TokenCache::new(config_dir()?.join("tokens.json")),
        })
    }

    /// Returns a valid access token: cached, refreshed, or from an
    /// interactive PKCE flow, in that order.
    pub fn access_token(&self) -> Result<String> {
        let now = Utc::now().timestamp();

        match self.cache.load() {
            Ok(Some(cached)) if cached.is_usable(&self.scope, now) => {
                return Ok(cached.access_token);
            }
            Ok(_) => {}
            Err(e) => warn!("Ignoring unreadable token cache {}: {e}", self.cache.path().display()),
        }

        if let Some(rt) = token_store::load_refresh_token(&self.user_email)? {
            match oauth::refresh_access_token(&self.client_id, self.client_secret.as_deref(), &rt) {
                Ok(tokens) => return self.remember(tokens, now),
                Err(e) => warn!("Refresh failed: {e}, falling back to interactive auth"),
            }
        }

        info!("No usable OAuth token for {}; starting interactive authorization", self.user_email);
        let tokens = oauth::perform_pkce_flow(
            &self.client_id,
            self.client_secret.as_deref(),
            &self.redirect_uri,
            &self.scope,
        )?;
        self.remember(tokens, now)
    }

    fn remember(&self, tokens: oauth::Tokens, now: i64) -> Result<String> {
        if let Some(refresh) = &tokens.refresh_token
            && let Err(e) = token_store::save_refresh_token(&self.user_email, refresh)
        {
            warn!("Couldn't save refresh token to keyring: {e}");
        }

        let lifetime = tokens
            .expires_in
            .map(|s| s as i64)
            .unwrap_or(DEFAULT_LIFETIME_SECS);
        let cached = CachedToken {
            access_token: tokens.access_token,
            expires_at_epoch: now + lifetime,
            scope: self.scope.clone(),
        };
        if let Err(e) = self.cache.save(&cached) {
            warn!("Couldn't save token metadata: {e}");
        }
        Ok(cached.access_token)
    }
}
