use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::daemon::parse_schedule;
use crate::domain::digest::Period;
use crate::error::ConfigError;

pub const APP_DIR: &str = "mail_digest";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MailboxStrategy {
    /// Stateful IMAP session with `SINCE` search.
    Imap,
    /// Gmail REST list + per-message detail fetch.
    GmailApi,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MailboxConfig {
    pub strategy: MailboxStrategy,
    pub user_email: String,
    #[serde(default = "default_imap_server")]
    pub imap_server: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    pub app_password: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DigestConfig {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_lookback_hours")]
    pub morning_lookback_hours: u32,
    #[serde(default = "default_lookback_hours")]
    pub evening_lookback_hours: u32,
    #[serde(default = "default_morning_schedule")]
    pub morning_schedule: String,
    #[serde(default = "default_evening_schedule")]
    pub evening_schedule: String,
    #[serde(default = "default_max_emails")]
    pub max_emails_per_digest: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_server")]
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

fn default_imap_server() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_lookback_hours() -> u32 {
    12
}

fn default_morning_schedule() -> String {
    "0 7 * * *".to_string()
}

fn default_evening_schedule() -> String {
    "0 21 * * *".to_string()
}

fn default_max_emails() -> usize {
    50
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            morning_lookback_hours: default_lookback_hours(),
            evening_lookback_hours: default_lookback_hours(),
            morning_schedule: default_morning_schedule(),
            evening_schedule: default_evening_schedule(),
            max_emails_per_digest: default_max_emails(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: default_smtp_server(),
            port: default_smtp_port(),
            username: None,
            password: None,
        }
    }
}

impl Config {
    pub fn lookback_hours(&self, period: Period) -> u32 {
        match period {
            Period::Morning => self.digest.morning_lookback_hours,
            Period::Evening => self.digest.evening_lookback_hours,
        }
    }

    pub fn schedule(&self, period: Period) -> &str {
        match period {
            Period::Morning => &self.digest.morning_schedule,
            Period::Evening => &self.digest.evening_schedule,
        }
    }

    /// App password from the file, else `GMAIL_APP_PASSWORD`.
    pub fn app_password(&self) -> Option<String> {
        self.mailbox
            .app_password
            .clone()
            .or_else(|| std::env::var("GMAIL_APP_PASSWORD").ok())
            .filter(|s| !s.is_empty())
    }

    /// API key from the file, else `OPENAI_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.summarizer
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|s| !s.is_empty())
    }

    pub fn smtp_username(&self) -> String {
        self.smtp
            .username
            .clone()
            .unwrap_or_else(|| self.mailbox.user_email.clone())
    }

    pub fn smtp_password(&self) -> Option<String> {
        self.smtp.password.clone().or_else(|| self.app_password())
    }

    pub fn redirect_uri(&self) -> String {
        self.mailbox
            .redirect_uri
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8080/callback".to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox.user_email.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "mailbox.user_email".into(),
                hint: "Set the address of the mailbox to digest.".into(),
            });
        }
        if self.digest.recipients.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "digest.recipients".into(),
                hint: "List at least one address to receive the digest.".into(),
            });
        }
        for (key, hours) in [
            ("digest.morning_lookback_hours", self.digest.morning_lookback_hours),
            ("digest.evening_lookback_hours", self.digest.evening_lookback_hours),
        ] {
            if hours == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: "must be greater than zero".into(),
                });
            }
        }
        if self.digest.max_emails_per_digest == 0 {
            return Err(ConfigError::InvalidValue {
                key: "digest.max_emails_per_digest".into(),
                message: "must be greater than zero".into(),
            });
        }
        for (key, expr) in [
            ("digest.morning_schedule", &self.digest.morning_schedule),
            ("digest.evening_schedule", &self.digest.evening_schedule),
        ] {
            parse_schedule(expr).map_err(|e| ConfigError::InvalidValue {
                key: key.into(),
                message: e.to_string(),
            })?;
        }
        match self.mailbox.strategy {
            MailboxStrategy::Imap => {
                if self.app_password().is_none() && self.mailbox.client_id.is_none() {
                    return Err(ConfigError::MissingRequired {
                        key: "mailbox.app_password".into(),
                        hint: "Set it (or GMAIL_APP_PASSWORD), or set mailbox.client_id for XOAUTH2."
                            .into(),
                    });
                }
            }
            MailboxStrategy::GmailApi => {
                if self.mailbox.client_id.is_none() {
                    return Err(ConfigError::MissingRequired {
                        key: "mailbox.client_id".into(),
                        hint: "The Gmail API strategy needs an OAuth client id.".into(),
                    });
                }
            }
        }
        if self.api_key().is_none() {
            return Err(ConfigError::MissingRequired {
                key: "summarizer.api_key".into(),
                hint: "Set it in the config file or via OPENAI_API_KEY.".into(),
            });
        }
        Ok(())
    }
}

pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingRequired {
            key: "config_dir".into(),
            hint: "No per-user config directory available; pass --config.".into(),
        })?
        .join(APP_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

fn template() -> Config {
    Config {
        mailbox: MailboxConfig {
            strategy: MailboxStrategy::Imap,
            user_email: "you@example.com".to_string(),
            imap_server: default_imap_server(),
            imap_port: default_imap_port(),
            app_password: None,
            client_id: None,
            redirect_uri: None,
        },
        digest: DigestConfig {
            recipients: vec!["team@example.com".to_string()],
            ..DigestConfig::default()
        },
        summarizer: SummarizerConfig::default(),
        smtp: SmtpConfig::default(),
    }
}

/// Load and validate the config at `path`, or at the default location.
///
/// A missing file is replaced by a template and reported as an error so the
/// user edits it before the first real run.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let sample = toml::to_string_pretty(&template()).map_err(|e| {
            ConfigError::InvalidValue {
                key: "template".into(),
                message: e.to_string(),
            }
        })?;
        fs::write(&path, sample)?;
        return Err(ConfigError::TemplateCreated(path));
    }
    let s = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&s)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[mailbox]
strategy = "imap"
user_email = "me@example.com"
app_password = "secret"

[digest]
recipients = ["team@example.com"]

[summarizer]
api_key = "sk-test"
"#;

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.mailbox.imap_server, "imap.gmail.com");
        assert_eq!(cfg.mailbox.imap_port, 993);
        assert_eq!(cfg.digest.morning_lookback_hours, 12);
        assert_eq!(cfg.digest.max_emails_per_digest, 50);
        assert_eq!(cfg.schedule(Period::Evening), "0 21 * * *");
        assert_eq!(cfg.summarizer.model, "gpt-4");
        assert_eq!(cfg.smtp.port, 465);
        assert_eq!(cfg.smtp_username(), "me@example.com");
        assert_eq!(cfg.smtp_password().as_deref(), Some("secret"));
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_cap() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.digest.max_emails_per_digest = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_bad_schedule() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.digest.morning_schedule = "every morning".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("digest.morning_schedule"));
    }

    #[test]
    fn gmail_api_needs_client_id() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.mailbox.strategy = MailboxStrategy::GmailApi;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn missing_file_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::TemplateCreated(_)));
        assert!(path.exists());

        let written: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.mailbox.user_email, "you@example.com");
    }

    #[test]
    fn loads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, MINIMAL).unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.digest.recipients, vec!["team@example.com".to_string()]);
    }
}
