pub mod render;

use chrono::{DateTime, Local};

use crate::domain::digest::{DigestReport, Period};
use crate::domain::summary::{EmailSummary, Priority};

pub fn report_id(generated_at: DateTime<Local>) -> String {
    format!("digest-{}", generated_at.format("%Y%m%d-%H%M%S"))
}

/// Wrap already-ordered summaries into a report. Order is kept as given.
pub fn build_digest(
    summaries: Vec<EmailSummary>,
    period: Period,
    generated_at: DateTime<Local>,
) -> DigestReport {
    let high_priority_count = summaries
        .iter()
        .filter(|s| s.priority == Priority::High)
        .count();

    DigestReport {
        report_id: report_id(generated_at),
        period,
        generated_at,
        email_count: summaries.len(),
        high_priority_count,
        summaries,
    }
}
