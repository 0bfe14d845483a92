use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Mailbox-scoped message identifier (IMAP UID or Gmail message id).
pub type EmailId = String;

/// Protocol-independent view of one fetched message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: EmailId,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub date: DateTime<FixedOffset>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}
