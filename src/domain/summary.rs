use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::email::{EmailId, EmailMessage};

/// Urgency class assigned by the summarizer.
///
/// Variant order is the display order, so `High < Medium < Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Anything that is not one of the three known labels becomes `Low`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub message_id: EmailId,
    pub sender: String,
    pub subject: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub priority: Priority,
    pub date: DateTime<FixedOffset>,
}

impl EmailSummary {
    pub fn for_message(
        email: &EmailMessage,
        key_points: Vec<String>,
        action_items: Vec<String>,
        priority: Priority,
    ) -> Self {
        Self {
            message_id: email.id.clone(),
            sender: email.sender.clone(),
            subject: email.subject.clone(),
            key_points,
            action_items,
            priority,
            date: email.date,
        }
    }
}
