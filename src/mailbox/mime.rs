use chrono::DateTime;
use chrono::Utc;
use mailparse::MailHeaderMap;

use super::MailboxError;
use crate::domain::CanonicalMessage;
use crate::domain::SenderAddress;

/// Decodes a raw RFC 5322 message into a [`CanonicalMessage`] (§4.B).
/// Multipart messages prefer a `text/plain` part; failing that, the first
/// `text/html` part is stripped to plain text with `html2text`.
pub fn decode_mime(raw: &[u8]) -> Result<CanonicalMessage, MailboxError> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| MailboxError::MalformedMessage(e.to_string()))?;

    let headers = &parsed.headers;
    let subject = headers.get_first_value("Subject").unwrap_or_default();
    let from_header = headers.get_first_value("From").unwrap_or_default();
    let (sender_display_name, sender_raw) = split_display_name(&from_header);

    let received_at = headers
        .get_first_value("Date")
        .and_then(|raw| mailparse::dateparse(&raw).ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .unwrap_or_else(Utc::now);

    let message_id =
        headers.get_first_value("Message-ID").map(|v| v.trim_matches(['<', '>']).to_string()).unwrap_or_else(|| CanonicalMessage::synthesize_message_id(received_at));

    let sender_address = SenderAddress::parse(sender_raw).map_err(MailboxError::MalformedMessage)?;
    let text_body = extract_text_body(&parsed)?;

    Ok(CanonicalMessage { message_id, subject, sender_address, sender_display_name, text_body, received_at })
}

fn split_display_name(from_header: &str) -> (Option<String>, String) {
    if let Some(open) = from_header.find('<') {
        if let Some(close) = from_header.find('>') {
            let name = from_header[..open].trim().trim_matches('"').to_string();
            let addr = from_header[open + 1..close].to_string();
            return (if name.is_empty() { None } else { Some(name) }, addr);
        }
    }
    (None, from_header.trim().to_string())
}

fn extract_text_body(parsed: &mailparse::ParsedMail) -> Result<String, MailboxError> {
    if parsed.subparts.is_empty() {
        return decode_single_part(parsed);
    }

    let mut html_fallback: Option<String> = None;
    for part in &parsed.subparts {
        let mime = part.ctype.mimetype.to_lowercase();
        if mime == "text/plain" {
            return decode_single_part(part);
        }
        if mime == "text/html" && html_fallback.is_none() {
            html_fallback = Some(decode_single_part(part)?);
        }
        if mime.starts_with("multipart/") {
            if let Ok(nested) = extract_text_body(part) {
                return Ok(nested);
            }
        }
    }

    match html_fallback {
        Some(html) => Ok(html2text::from_read(html.as_bytes(), 9999)),
        None => decode_single_part(parsed),
    }
}

fn decode_single_part(part: &mailparse::ParsedMail) -> Result<String, MailboxError> {
    part.get_body().map_err(|e| MailboxError::MalformedMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::decode_mime;

    #[test]
    fn decodes_plain_text_message() {
        let raw = b"From: Alice <alice@example.com>\r\nSubject: Hi\r\nMessage-ID: <abc123@example.com>\r\nDate: Mon, 1 Jan 2024 00:00:00 +0000\r\nContent-Type: text/plain\r\n\r\nHello there.\r\n";
        let msg = decode_mime(raw).unwrap();
        assert_eq!(msg.subject, "Hi");
        assert_eq!(msg.sender_address.as_ref(), "alice@example.com");
        assert_eq!(msg.sender_display_name.as_deref(), Some("Alice"));
        assert_eq!(msg.message_id, "abc123@example.com");
        assert!(msg.text_body.contains("Hello there."));
    }

    #[test]
    fn synthesizes_message_id_when_missing() {
        let raw = b"From: bob@example.com\r\nSubject: No id\r\nContent-Type: text/plain\r\n\r\nBody\r\n";
        let msg = decode_mime(raw).unwrap();
        assert!(msg.message_id.starts_with("unknown-"));
    }
}
