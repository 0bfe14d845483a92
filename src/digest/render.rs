use html_escape::encode_text;
use std::fmt::Write as _;

use crate::domain::digest::DigestReport;
use crate::domain::summary::{EmailSummary, Priority};
use crate::error::DeliveryError;

const PLAIN_TEXT_WIDTH: usize = 80;

const STYLE: &str = r#"
body { font-family: Arial, sans-serif; margin: 0; padding: 20px; color: #333; }
.container { max-width: 800px; margin: 0 auto; }
.header { padding: 20px; background-color: #f5f5f5; border-bottom: 1px solid #ddd; }
.summary { margin-bottom: 30px; }
.email-item { margin-bottom: 20px; padding: 15px; border-left: 4px solid #ccc; background-color: #f9f9f9; }
.email-item.high { border-left-color: #ff4d4d; }
.email-item.medium { border-left-color: #ffad33; }
.email-item.low { border-left-color: #2ecc71; }
.email-sender { font-weight: bold; }
.email-subject { font-size: 16px; margin: 5px 0; }
.email-time { color: #888; font-size: 12px; }
.key-points { margin-top: 10px; }
.action-items { margin-top: 10px; color: #e74c3c; }
ul { padding-left: 20px; }
li { margin-bottom: 5px; }
.priority-tag { display: inline-block; padding: 3px 8px; border-radius: 3px; font-size: 12px; color: white; }
.priority-high { background-color: #ff4d4d; }
.priority-medium { background-color: #ffad33; }
.priority-low { background-color: #2ecc71; }
"#;

pub fn subject_line(report: &DigestReport) -> String {
    format!(
        "{} Email Digest - {}",
        report.period.display_name(),
        report.generated_at.format("%B %d, %Y")
    )
}

fn section_heading(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "⚠️ High Priority",
        Priority::Medium => "Medium Priority",
        Priority::Low => "Low Priority",
    }
}

fn write_list(html: &mut String, class: &str, title: &str, items: &[String]) {
    let _ = write!(html, r#"<div class="{class}"><strong>{title}:</strong><ul>"#);
    for item in items {
        let _ = write!(html, "<li>{}</li>", encode_text(item));
    }
    html.push_str("</ul></div>");
}

fn write_summary(html: &mut String, summary: &EmailSummary) {
    let class = summary.priority.as_str().to_ascii_lowercase();
    let _ = write!(
        html,
        r#"<div class="email-item {class}"><div class="email-sender">{}</div><div class="email-subject">{}</div><div class="email-time">{}</div><span class="priority-tag priority-{class}">{}</span>"#,
        encode_text(&summary.sender),
        encode_text(&summary.subject),
        summary.date.format("%I:%M %p"),
        summary.priority,
    );
    write_list(html, "key-points", "Key Points", &summary.key_points);
    if !summary.action_items.is_empty() {
        write_list(html, "action-items", "Action Items", &summary.action_items);
    }
    html.push_str("</div>");
}

pub fn render_html(report: &DigestReport) -> String {
    let mut html = String::with_capacity(4096);
    let _ = write!(
        html,
        r#"<html><head><meta charset="utf-8"><style>{STYLE}</style></head><body><div class="container"><div class="header"><h1>{} Email Digest</h1><p>{}</p><p>Total emails: {} | High priority: {}</p></div><div class="summary">"#,
        report.period.display_name(),
        report.generated_at.format("%A, %B %d, %Y"),
        report.email_count,
        report.high_priority_count,
    );

    if report.is_empty() {
        html.push_str("<p>No new emails during this period.</p>");
    }
    for section in report.sections() {
        let _ = write!(html, "<h2>{}</h2>", section_heading(section.priority));
        for summary in section.summaries {
            write_summary(&mut html, summary);
        }
    }

    html.push_str("</div></div></body></html>");
    html
}

/// Plain-text alternative derived from the HTML body.
pub fn render_text(html: &str) -> Result<String, DeliveryError> {
    html2text::from_read(html.as_bytes(), PLAIN_TEXT_WIDTH)
        .map_err(|e| DeliveryError::Render(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::build_digest;
    use crate::domain::digest::Period;
    use chrono::{DateTime, Local, TimeZone};

    fn summary(subject: &str, priority: Priority, actions: &[&str]) -> EmailSummary {
        EmailSummary {
            message_id: subject.to_string(),
            sender: "Eve <eve@example.com>".to_string(),
            subject: subject.to_string(),
            key_points: vec!["Point <one>".to_string()],
            action_items: actions.iter().map(|s| s.to_string()).collect(),
            priority,
            date: DateTime::parse_from_rfc3339("2024-05-01T14:05:00+00:00").unwrap(),
        }
    }

    fn generated() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap()
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_digest(Vec::new(), Period::Evening, generated());
        let html = render_html(&report);
        assert!(html.contains("Evening Email Digest"));
        assert!(html.contains("Total emails: 0 | High priority: 0"));
        assert!(html.contains("No new emails during this period."));
        assert!(!html.contains("<h2>"));
    }

    #[test]
    fn sections_are_rendered_in_priority_order_and_escaped() {
        let report = build_digest(
            vec![
                summary("urgent & late", Priority::High, &["Call back"]),
                summary("fyi", Priority::Low, &[]),
            ],
            Period::Morning,
            generated(),
        );
        let html = render_html(&report);

        let high = html.find("High Priority</h2>").unwrap();
        let low = html.find("Low Priority</h2>").unwrap();
        assert!(high < low);
        assert!(!html.contains("Medium Priority</h2>"));
        assert!(html.contains("urgent &amp; late"));
        assert!(html.contains("Eve &lt;eve@example.com&gt;"));
        assert!(html.contains("Point &lt;one&gt;"));
        assert_eq!(html.matches("Action Items").count(), 1);
        assert!(html.contains("02:05 PM"));
    }

    #[test]
    fn subject_names_period_and_date() {
        let report = build_digest(Vec::new(), Period::Morning, generated());
        assert_eq!(subject_line(&report), "Morning Email Digest - May 01, 2024");
    }

    #[test]
    fn plain_text_alternative() {
        let report = build_digest(vec![summary("fyi", Priority::Low, &[])], Period::Morning, generated());
        let text = render_text(&render_html(&report)).unwrap();
        assert!(text.contains("Morning Email Digest"));
        assert!(text.contains("Point <one>"));
    }
}
