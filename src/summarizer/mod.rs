//! Per-message LLM summaries.
//!
//! The model is asked for a JSON object with `key_points`, `action_items` and
//! `priority`. Output that is not a JSON object degrades to a placeholder
//! summary; only a failed call drops the message.

pub mod client;

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::domain::email::EmailMessage;
use crate::domain::summary::{EmailSummary, Priority};
use crate::error::SummarizeError;

pub use client::{CompletionClient, OpenAiClient};

pub const SYSTEM_PROMPT: &str = "You are an assistant that summarizes emails into key points and action items. Extract only the most important information and be concise.";

pub const PARSE_FAILURE_POINT: &str = "Failed to parse email content";

const MAX_KEY_POINTS: usize = 5;

pub fn build_prompt(email: &EmailMessage) -> String {
    format!(
        r#"Please summarize the following email and extract key information.

FROM: {sender}
SUBJECT: {subject}
DATE: {date}
BODY:
{body}

Please provide:
1. A list of 2-5 key points from this email
2. Any action items that need to be addressed
3. A priority level (High/Medium/Low) based on urgency and importance

Format your response as JSON with the following structure:
{{
    "key_points": ["point 1", "point 2", ...],
    "action_items": ["action 1", "action 2", ...],
    "priority": "High|Medium|Low"
}}"#,
        sender = email.sender,
        subject = email.subject,
        date = email.date.to_rfc2822(),
        body = email.body,
    )
}

/// Fields extracted from one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSummary {
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub priority: Priority,
}

impl ParsedSummary {
    pub fn degraded() -> Self {
        Self {
            key_points: vec![PARSE_FAILURE_POINT.to_string()],
            action_items: Vec::new(),
            priority: Priority::Low,
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::String(_)) => vec![single],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Never fails: non-JSON degrades, missing fields default to empty / `Low`.
pub fn parse_response(content: &str) -> ParsedSummary {
    let object = match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!("Summary response is JSON but not an object: {other}");
            return ParsedSummary::degraded();
        }
        Err(e) => {
            warn!("Summary response is not valid JSON: {e}");
            return ParsedSummary::degraded();
        }
    };

    let mut key_points = string_list(object.get("key_points"));
    key_points.truncate(MAX_KEY_POINTS);

    ParsedSummary {
        key_points,
        action_items: string_list(object.get("action_items")),
        priority: object
            .get("priority")
            .and_then(Value::as_str)
            .map(Priority::from_label)
            .unwrap_or(Priority::Low),
    }
}

/// Most urgent first, newest first within a priority. Stable.
pub fn sort_summaries(summaries: &mut [EmailSummary]) {
    summaries.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| b.date.cmp(&a.date))
    });
}

pub struct Summarizer {
    client: Box<dyn CompletionClient>,
}

impl Summarizer {
    pub fn new(client: Box<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn summarize(&self, email: &EmailMessage) -> Result<EmailSummary, SummarizeError> {
        let content = self.client.complete(SYSTEM_PROMPT, &build_prompt(email))?;
        let parsed = parse_response(&content);
        Ok(EmailSummary::for_message(
            email,
            parsed.key_points,
            parsed.action_items,
            parsed.priority,
        ))
    }

    /// Summarize each message independently. A message whose call fails is
    /// logged and left out of the result.
    pub fn summarize_all(&self, emails: &[EmailMessage]) -> Vec<EmailSummary> {
        let mut summaries = Vec::with_capacity(emails.len());
        for email in emails {
            match self.summarize(email) {
                Ok(summary) => {
                    debug!("Summarized email {} as {}", email.id, summary.priority);
                    summaries.push(summary);
                }
                Err(e) => error!("Error summarizing email {}: {e}", email.id),
            }
        }

        let skipped = emails.len() - summaries.len();
        if skipped > 0 {
            info!("{skipped} of {} emails could not be summarized", emails.len());
        }

        sort_summaries(&mut summaries);
        summaries
    }
}
