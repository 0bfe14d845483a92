//! Typed errors for the surfaces callers match on.
//!
//! Everything else travels as `anyhow::Error`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Created template config at {}; edit it and run again", .0.display())]
    TemplateCreated(PathBuf),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single summarization call. Malformed model output is not an
/// error; it degrades to a placeholder summary instead.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("{provider} returned no completion choices")]
    EmptyResponse { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("No recipients configured")]
    NoRecipients,

    #[error("No SMTP password for {0}; set smtp.password or GMAIL_APP_PASSWORD")]
    MissingCredentials(String),

    #[error("Failed to build digest email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Failed to render digest: {0}")]
    Render(String),
}
