use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::summary::{EmailSummary, Priority};

/// Scheduling window a digest covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Morning,
    Evening,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Evening => "evening",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Period::Morning => "Morning",
            Period::Evening => "Evening",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Period::Morning),
            "evening" => Ok(Period::Evening),
            other => Err(format!("invalid period '{other}': expected morning or evening")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestReport {
    pub report_id: String,
    pub period: Period,
    pub generated_at: DateTime<Local>,
    pub email_count: usize,
    pub high_priority_count: usize,
    pub summaries: Vec<EmailSummary>,
}

/// One priority bucket of a digest, in digest order.
#[derive(Debug)]
pub struct DigestSection<'a> {
    pub priority: Priority,
    pub summaries: Vec<&'a EmailSummary>,
}

impl DigestReport {
    /// Partition summaries by priority. Sections come out High, Medium, Low;
    /// empty ones are omitted and relative order inside each is kept.
    pub fn sections(&self) -> Vec<DigestSection<'_>> {
        Priority::ALL
            .iter()
            .map(|&priority| DigestSection {
                priority,
                summaries: self
                    .summaries
                    .iter()
                    .filter(|s| s.priority == priority)
                    .collect(),
            })
            .filter(|section| !section.summaries.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}
