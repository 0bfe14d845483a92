use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{error, info};

use crate::config::Config;
use crate::delivery::DigestDelivery;
use crate::digest::render::{render_html, render_text, subject_line};
use crate::domain::digest::DigestReport;
use crate::error::DeliveryError;

const STARTTLS_PORT: u16 = 587;

fn mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Multipart/alternative digest mail: plain text first, HTML preferred.
pub fn build_message(
    from: &str,
    recipients: &[String],
    report: &DigestReport,
) -> Result<Message, DeliveryError> {
    if recipients.is_empty() {
        return Err(DeliveryError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(mailbox(from)?)
        .subject(subject_line(report));
    for to in recipients {
        builder = builder.to(mailbox(to)?);
    }

    let html = render_html(report);
    let text = render_text(&html)?;
    Ok(builder.multipart(MultiPart::alternative_plain_html(text, html))?)
}

fn credentials(username: String, password: Option<String>) -> Result<Credentials, DeliveryError> {
    match password {
        Some(password) => Ok(Credentials::new(username, password)),
        None => Err(DeliveryError::MissingCredentials(username)),
    }
}

pub struct SmtpDelivery {
    transport: SmtpTransport,
    from: String,
    recipients: Vec<String>,
}

impl SmtpDelivery {
    pub fn new(cfg: &Config) -> Result<Self, DeliveryError> {
        let credentials = credentials(cfg.smtp_username(), cfg.smtp_password())?;

        let builder = if cfg.smtp.port == STARTTLS_PORT {
            SmtpTransport::starttls_relay(&cfg.smtp.server)?
        } else {
            SmtpTransport::relay(&cfg.smtp.server)?
        };
        let transport = builder
            .port(cfg.smtp.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: cfg.mailbox.user_email.clone(),
            recipients: cfg.digest.recipients.clone(),
        })
    }

    fn send(&self, report: &DigestReport) -> Result<(), DeliveryError> {
        let message = build_message(&self.from, &self.recipients, report)?;
        self.transport.send(&message)?;
        Ok(())
    }
}

impl DigestDelivery for SmtpDelivery {
    fn deliver(&self, report: &DigestReport) -> bool {
        match self.send(report) {
            Ok(()) => {
                info!(
                    "Digest {} sent to {} recipient(s)",
                    report.report_id,
                    self.recipients.len()
                );
                true
            }
            Err(e) => {
                error!("Failed to deliver digest {}: {e}", report.report_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::build_digest;
    use crate::domain::digest::Period;
    use chrono::{Local, TimeZone};

    fn report() -> DigestReport {
        let generated = Local.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
        build_digest(Vec::new(), Period::Morning, generated)
    }

    #[test]
    fn no_recipients_is_an_error() {
        let err = build_message("me@example.com", &[], &report()).unwrap_err();
        assert!(matches!(err, DeliveryError::NoRecipients));
    }

    #[test]
    fn bad_recipient_is_reported() {
        let recipients = vec!["ok@example.com".to_string(), "not an address".to_string()];
        let err = build_message("me@example.com", &recipients, &report()).unwrap_err();
        match err {
            DeliveryError::InvalidAddress { address, .. } => assert_eq!(address, "not an address"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn message_carries_subject_recipients_and_both_bodies() {
        let recipients = vec!["a@example.com".to_string(), "b@example.com".to_string()];
        let message = build_message("me@example.com", &recipients, &report()).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("Subject: Morning Email Digest - May 01, 2024"));
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn missing_password_is_reported_with_username() {
        match credentials("me@example.com".to_string(), None) {
            Err(DeliveryError::MissingCredentials(user)) => assert_eq!(user, "me@example.com"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("credentials built without a password"),
        }
        assert!(credentials("me@example.com".to_string(), Some("pw".to_string())).is_ok());
    }
}
