use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Seconds shaved off the expiry so a token is not used right as it lapses.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Non-secret access token metadata, stored as JSON next to the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at_epoch: i64,
    pub scope: String,
}

impl CachedToken {
    pub fn is_usable(&self, scope: &str, now_epoch: i64) -> bool {
        self.scope == scope && now_epoch + EXPIRY_MARGIN_SECS < self.expires_at_epoch
    }
}

#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<CachedToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&s)?))
    }

    pub fn save(&self, token: &CachedToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(token)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("tokens.json"));
        assert!(cache.load().unwrap().is_none());

        let token = CachedToken {
            access_token: "ya29.a0".into(),
            expires_at_epoch: 2_000,
            scope: SCOPE.into(),
        };
        cache.save(&token).unwrap();
        assert_eq!(cache.load().unwrap(), Some(token));
    }

    #[test]
    fn expiry_and_scope_checks() {
        let token = CachedToken {
            access_token: "t".into(),
            expires_at_epoch: 1_000,
            scope: SCOPE.into(),
        };
        assert!(token.is_usable(SCOPE, 900));
        assert!(!token.is_usable(SCOPE, 950));
        assert!(!token.is_usable("https://mail.google.com/", 100));
    }
}
