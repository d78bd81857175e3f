//! RFC 5322 extraction using mailparse.
//!
//! Turns a raw inbound message into the flat `EmailRecord` the queue carries.
//! Body parts that are missing or cannot be decoded become empty strings; only
//! a message that cannot be parsed at all is an error.

use anyhow::{Context, Result};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use tracing::{info, warn};

use crate::queue::{EmailRecord, DEFAULT_SUBJECT};

/// Build a queue record from envelope addresses and the raw message.
pub fn extract_email(from: &str, to: &str, raw_content: &str) -> Result<EmailRecord> {
    let mail = parse_mail(raw_content.as_bytes()).context("Failed to parse email")?;

    let subject = mail
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

    let text = find_part(&mail, "text/plain").unwrap_or_default();
    let html = find_part(&mail, "text/html").unwrap_or_default();

    info!(
        from = %from,
        to = %to,
        subject = %subject,
        text_length = text.len(),
        html_length = html.len(),
        "email_extracted"
    );

    Ok(EmailRecord {
        from: from.to_string(),
        to: to.to_string(),
        subject,
        text,
        html,
    })
}

/// Depth-first search for the first part of `mimetype`.
fn find_part(mail: &ParsedMail, mimetype: &str) -> Option<String> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
            return decode_body(mail);
        }
        return None;
    }

    mail.subparts.iter().find_map(|part| find_part(part, mimetype))
}

fn decode_body(mail: &ParsedMail) -> Option<String> {
    match mail.get_body() {
        Ok(body) => Some(body),
        Err(e) => {
            warn!(
                content_type = %mail.ctype.mimetype,
                error = %e,
                "email_body_decode_failed"
            );
            None
        }
    }
}
