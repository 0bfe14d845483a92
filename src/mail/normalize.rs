//! Turns provider-native messages into [`EmailMessage`]s.
//!
//! Every sub-step (one header, one part) is best-effort: failures are logged
//! and skipped, and a message is never dropped because of them.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use log::warn;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::domain::email::EmailMessage;
use crate::mail::decoders::{decode_mime_words, decode_text};
use crate::mail::raw::{ApiMessage, ApiPart, RawMessage};

const NO_SUBJECT: &str = "(No Subject)";
const UNKNOWN_SENDER: &str = "unknown";

pub fn normalize(raw: &RawMessage) -> EmailMessage {
    normalize_at(raw, Utc::now().fixed_offset())
}

/// `fetched_at` stands in for dates that cannot be parsed.
pub fn normalize_at(raw: &RawMessage, fetched_at: DateTime<FixedOffset>) -> EmailMessage {
    match raw {
        RawMessage::Rfc822 { id, bytes } => normalize_rfc822(id, bytes, fetched_at),
        RawMessage::Api(msg) => normalize_api(msg, fetched_at),
    }
}

pub fn parse_date(value: &str, fetched_at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return dt;
    }
    // dateparse yields 0 for input it cannot read at all
    if let Some(dt) = mailparse::dateparse(value)
        .ok()
        .filter(|&epoch| epoch != 0)
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
    {
        return dt.fixed_offset();
    }
    if !value.is_empty() {
        warn!("Unparseable Date header {value:?}; using fetch time");
    }
    fetched_at
}

pub fn parse_recipients(to: &str) -> Vec<String> {
    to.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn normalize_rfc822(id: &str, bytes: &[u8], fetched_at: DateTime<FixedOffset>) -> EmailMessage {
    let parsed = match mailparse::parse_mail(bytes) {
        Ok(p) => p,
        Err(e) => {
            warn!("Email {id}: MIME parse failed ({e}); keeping raw text as body");
            return EmailMessage {
                id: id.to_string(),
                sender: UNKNOWN_SENDER.to_string(),
                recipients: Vec::new(),
                subject: NO_SUBJECT.to_string(),
                body: decode_text(bytes, None),
                date: fetched_at,
                labels: Vec::new(),
                attachments: Vec::new(),
            };
        }
    };

    let headers = &parsed.headers;
    let subject = non_empty_or(headers.get_first_value("Subject"), NO_SUBJECT);
    let sender = non_empty_or(headers.get_first_value("From"), UNKNOWN_SENDER);
    let date = headers
        .get_first_value("Date")
        .map(|d| parse_date(&d, fetched_at))
        .unwrap_or(fetched_at);
    let recipients = headers
        .get_first_value("To")
        .map(|to| parse_recipients(&to))
        .unwrap_or_default();

    let mut body = String::new();
    let mut attachments = Vec::new();
    if parsed.subparts.is_empty() {
        if let Some(text) = decode_part(id, &parsed) {
            body = text;
        }
    } else {
        walk_parts(id, &parsed, &mut body, &mut attachments);
    }

    EmailMessage {
        id: id.to_string(),
        sender,
        recipients,
        subject,
        body,
        date,
        labels: Vec::new(),
        attachments,
    }
}

fn is_attachment(part: &ParsedMail) -> bool {
    part.get_content_disposition().disposition == DispositionType::Attachment
}

fn attachment_name(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| decode_mime_words(name.as_bytes()))
        .filter(|name| !name.trim().is_empty())
}

fn is_text(mimetype: &str) -> bool {
    let mimetype = mimetype.to_ascii_lowercase();
    mimetype == "text/plain" || mimetype == "text/html"
}

/// Depth-first over the whole part tree, like a MIME walk.
fn walk_parts(id: &str, part: &ParsedMail, body: &mut String, attachments: &mut Vec<String>) {
    if is_attachment(part) {
        if let Some(name) = attachment_name(part) {
            attachments.push(name);
        }
    } else if is_text(&part.ctype.mimetype)
        && let Some(text) = decode_part(id, part)
    {
        body.push_str(&text);
    }

    for sub in &part.subparts {
        walk_parts(id, sub, body, attachments);
    }
}

fn decode_part(id: &str, part: &ParsedMail) -> Option<String> {
    match part.get_body_raw() {
        Ok(raw) => {
            let charset = part.ctype.params.get("charset").map(String::as_str);
            Some(decode_text(&raw, charset))
        }
        Err(e) => {
            warn!("Email {id}: error decoding {} part: {e}", part.ctype.mimetype);
            None
        }
    }
}

fn normalize_api(msg: &ApiMessage, fetched_at: DateTime<FixedOffset>) -> EmailMessage {
    let empty = ApiPart::default();
    let payload = msg.payload.as_ref().unwrap_or(&empty);
    let header = |name: &str| payload.header(name).map(|v| decode_mime_words(v.as_bytes()));

    let subject = non_empty_or(header("Subject"), NO_SUBJECT);
    let sender = non_empty_or(header("From"), UNKNOWN_SENDER);
    let date = header("Date")
        .map(|d| parse_date(&d, fetched_at))
        .unwrap_or(fetched_at);
    let recipients = header("To")
        .map(|to| parse_recipients(&to))
        .unwrap_or_default();

    let mut body = String::new();
    let mut attachments = Vec::new();
    if payload.parts.is_empty() {
        if let Some(text) = decode_api_part(&msg.id, payload) {
            body = text;
        }
    } else {
        walk_api_parts(&msg.id, payload, &mut body, &mut attachments);
    }

    EmailMessage {
        id: msg.id.clone(),
        sender,
        recipients,
        subject,
        body,
        date,
        labels: msg.label_ids.clone(),
        attachments,
    }
}

fn is_api_attachment(part: &ApiPart) -> bool {
    let declared = part
        .header("Content-Disposition")
        .is_some_and(|d| d.to_ascii_lowercase().contains("attachment"));
    declared || !part.filename.trim().is_empty()
}

fn walk_api_parts(id: &str, part: &ApiPart, body: &mut String, attachments: &mut Vec<String>) {
    if is_api_attachment(part) {
        if !part.filename.trim().is_empty() {
            attachments.push(part.filename.clone());
        }
    } else if is_text(&part.mime_type)
        && let Some(text) = decode_api_part(id, part)
    {
        body.push_str(&text);
    }

    for sub in &part.parts {
        walk_api_parts(id, sub, body, attachments);
    }
}

fn decode_api_part(id: &str, part: &ApiPart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    let bytes = match general_purpose::URL_SAFE_NO_PAD.decode(data.trim().trim_end_matches('=')) {
        Ok(b) => b,
        Err(e) => {
            warn!("Email {id}: invalid base64 in {} part: {e}", part.mime_type);
            return None;
        }
    };
    let charset = part
        .header("Content-Type")
        .map(mailparse::parse_content_type)
        .and_then(|ct| ct.params.get("charset").cloned());
    Some(decode_text(&bytes, charset.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::raw::{ApiBody, ApiHeader};

    fn fetched_at() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00").unwrap()
    }

    fn rfc822(id: &str, text: &[u8]) -> RawMessage {
        RawMessage::Rfc822 {
            id: id.to_string(),
            bytes: text.to_vec(),
        }
    }

    #[test]
    fn single_part_message() {
        let raw = rfc822(
            "42",
            b"From: Alice <alice@example.com>\r\n\
To: bob@example.com, , carol@example.com \r\n\
Subject: =?UTF-8?Q?Caf=C3=A9_plans?=\r\n\
Date: Tue, 30 Apr 2024 09:15:00 +0200\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
See you at noon.\r\n",
        );

        let msg = normalize_at(&raw, fetched_at());
        assert_eq!(msg.id, "42");
        assert_eq!(msg.sender, "Alice <alice@example.com>");
        assert_eq!(msg.recipients, vec!["bob@example.com", "carol@example.com"]);
        assert_eq!(msg.subject, "Café plans");
        assert_eq!(msg.body.trim_end(), "See you at noon.");
        assert_eq!(msg.date.to_rfc3339(), "2024-04-30T09:15:00+02:00");
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn multipart_skips_attachments_and_keeps_text_parts() {
        let raw = rfc822(
            "7",
            b"From: ops@example.com\r\n\
To: me@example.com\r\n\
Subject: Report\r\n\
Date: Wed, 01 May 2024 08:00:00 +0000\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
R=E9sum=E9 attached.\r\n\
--XX\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML</p>\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
\r\n\
not part of the body\r\n\
--XX\r\n\
Content-Type: application/pdf; name=\"q1.pdf\"\r\n\
Content-Disposition: attachment\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--XX--\r\n",
        );

        let msg = normalize_at(&raw, fetched_at());
        assert!(msg.body.contains("Résumé attached."));
        assert!(msg.body.contains("<p>HTML</p>"));
        assert!(!msg.body.contains("not part of the body"));
        assert_eq!(msg.attachments, vec!["notes.txt", "q1.pdf"]);
    }

    #[test]
    fn undeclared_latin1_body_is_decoded_without_substitution() {
        let raw = rfc822(
            "9",
            b"From: a@example.com\r\nSubject: hi\r\n\r\nna\xefve caf\xe9\r\n",
        );
        let msg = normalize_at(&raw, fetched_at());
        assert_eq!(msg.body.trim_end(), "naïve café");
    }

    #[test]
    fn bad_date_and_missing_headers_fall_back() {
        let raw = rfc822("3", b"Date: sometime last week\r\n\r\nbody\r\n");
        let msg = normalize_at(&raw, fetched_at());
        assert_eq!(msg.date, fetched_at());
        assert_eq!(msg.subject, NO_SUBJECT);
        assert_eq!(msg.sender, UNKNOWN_SENDER);
        assert!(msg.recipients.is_empty());
    }

    #[test]
    fn unreadable_dates_use_fetch_time() {
        for value in ["garbage", "tomorrow", "sometime last week", "not a date at all", "32 Foo 2024", ""] {
            assert_eq!(parse_date(value, fetched_at()), fetched_at(), "value: {value:?}");
        }
    }

    #[test]
    fn lenient_date_formats_are_accepted() {
        let dt = parse_date("1 May 2024 10:00:00 GMT", fetched_at());
        assert_eq!(dt.timestamp(), 1714557600);
    }

    fn api_part(mime: &str, headers: &[(&str, &str)], data: Option<&str>) -> ApiPart {
        ApiPart {
            mime_type: mime.to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| ApiHeader {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            body: Some(ApiBody {
                data: data.map(str::to_string),
                ..ApiBody::default()
            }),
            ..ApiPart::default()
        }
    }

    #[test]
    fn gmail_payload_with_parts() {
        let plain = general_purpose::URL_SAFE.encode("Ship it?");
        let latin = general_purpose::URL_SAFE_NO_PAD.encode(b"d\xe9j\xe0 vu");
        let mut attachment = api_part("application/pdf", &[], None);
        attachment.filename = "deck.pdf".into();
        attachment.body = Some(ApiBody {
            attachment_id: Some("att-1".into()),
            size: 1024,
            data: None,
        });

        let mut payload = api_part(
            "multipart/mixed",
            &[
                ("subject", "Release"),
                ("From", "lead@example.com"),
                ("To", "dev1@example.com,dev2@example.com"),
                ("Date", "Wed, 01 May 2024 07:30:00 -0400"),
            ],
            None,
        );
        payload.parts = vec![
            api_part("text/plain", &[("Content-Type", "text/plain; charset=UTF-8")], Some(&plain)),
            api_part(
                "text/plain",
                &[("Content-Type", "text/plain; charset=\"windows-1252\"")],
                Some(&latin),
            ),
            attachment,
        ];

        let raw = RawMessage::Api(ApiMessage {
            id: "18f2a".into(),
            label_ids: vec!["INBOX".into(), "IMPORTANT".into()],
            payload: Some(payload),
            ..ApiMessage::default()
        });

        let msg = normalize_at(&raw, fetched_at());
        assert_eq!(msg.id, "18f2a");
        assert_eq!(msg.subject, "Release");
        assert_eq!(msg.recipients.len(), 2);
        assert_eq!(msg.body, "Ship it?déjà vu");
        assert_eq!(msg.labels, vec!["INBOX", "IMPORTANT"]);
        assert_eq!(msg.attachments, vec!["deck.pdf"]);
        assert_eq!(msg.date.to_rfc3339(), "2024-05-01T07:30:00-04:00");
    }

    #[test]
    fn gmail_bad_base64_part_is_skipped() {
        let good = general_purpose::URL_SAFE_NO_PAD.encode("kept");
        let mut payload = api_part("multipart/alternative", &[], None);
        payload.parts = vec![
            api_part("text/plain", &[], Some("!!not base64!!")),
            api_part("text/html", &[], Some(&good)),
        ];
        let raw = RawMessage::Api(ApiMessage {
            id: "x".into(),
            payload: Some(payload),
            ..ApiMessage::default()
        });

        let msg = normalize_at(&raw, fetched_at());
        assert_eq!(msg.body, "kept");
        assert_eq!(msg.date, fetched_at());
    }
}
