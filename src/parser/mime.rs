//! MIME message parsing: builds a [`MessageRecord`] with a classified part tree.
//!
//! Uses `mail-parser` internally, with a header-only fallback for messages it
//! cannot parse.

use chrono::{DateTime, Utc};
use mail_parser::{Encoding, HeaderValue, MessageParser, MimeHeaders, PartType};

use crate::error::{Result, SnapError};
use crate::model::address::EmailAddress;
use crate::model::message::{MessageBody, MessageRecord};
use crate::model::part::{EmbeddedData, MimePart, PartKind, TransferEncoding};

/// Maximum depth for recursive multipart parsing (to prevent stack overflow on adversarial input).
const MAX_DEPTH: usize = 10;

/// Filename given to inline parts that carry a Content-ID but no name.
pub const INLINE_PLACEHOLDER_NAME: &str = "image";

/// Prefix of part handles handed out for large parts.
const HANDLE_PREFIX: &str = "part:";

/// Parse a complete raw message (headers + body) into a [`MessageRecord`].
///
/// Leaf parts whose decoded size exceeds `inline_part_limit` carry only a
/// `part:<n>` handle instead of their bytes; see [`extract_part`].
/// Never fails: unparseable input yields a record with a plain-text body.
pub fn parse_message(raw_message: &[u8], sequence: u64, inline_part_limit: usize) -> MessageRecord {
    let message_bytes = skip_from_line(raw_message);

    let parser = MessageParser::default();
    match parser.parse(message_bytes) {
        Some(msg) => build_record(&msg, message_bytes, sequence, inline_part_limit),
        None => {
            tracing::warn!(sequence, "Could not parse message, using raw fallback");
            fallback_record(message_bytes, sequence)
        }
    }
}

/// Decode the bytes of the part behind a `part:<n>` handle.
pub fn extract_part(raw_message: &[u8], handle: &str) -> Result<Vec<u8>> {
    let index: usize = handle
        .strip_prefix(HANDLE_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| SnapError::Mime(format!("Malformed part handle '{handle}'")))?;

    let message_bytes = skip_from_line(raw_message);
    let msg = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| SnapError::Mime("Failed to parse message for part extraction".into()))?;

    let part = msg
        .parts
        .get(index)
        .ok_or_else(|| SnapError::Mime(format!("Part {index} not found in message")))?;
    encoded_body(&msg, part).decode()
}

fn build_record(
    msg: &mail_parser::Message<'_>,
    message_bytes: &[u8],
    sequence: u64,
    inline_part_limit: usize,
) -> MessageRecord {
    let id = msg
        .message_id()
        .map(str::to_string)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("message-{sequence}"));

    let date = msg
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(DateTime::UNIX_EPOCH);

    let from = msg
        .from()
        .and_then(|a| a.first())
        .map(|addr| {
            EmailAddress::new(
                addr.name().unwrap_or_default(),
                addr.address().unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    let to = msg
        .to()
        .map(|list| {
            list.iter()
                .map(|addr| {
                    EmailAddress::new(
                        addr.name().unwrap_or_default(),
                        addr.address().unwrap_or_default(),
                    )
                })
                .filter(|a| !a.address.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let html = msg
        .html_body
        .iter()
        .filter_map(|&i| msg.parts.get(i))
        .find_map(|part| match &part.body {
            PartType::Html(html) => Some(html.to_string()),
            _ => None,
        });
    let text = msg
        .text_body
        .iter()
        .filter_map(|&i| msg.parts.get(i))
        .find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.to_string()),
            _ => None,
        });

    let parts = match msg.parts.first() {
        Some(root) => match &root.body {
            PartType::Multipart(children) => children
                .iter()
                .filter_map(|&child| build_part(msg, child, 1, inline_part_limit))
                .collect(),
            _ => build_part(msg, 0, 1, inline_part_limit).into_iter().collect(),
        },
        None => Vec::new(),
    };

    MessageRecord {
        id,
        date,
        subject: msg.subject().unwrap_or_default().to_string(),
        from,
        to,
        raw: message_bytes.to_vec(),
        body: MessageBody { html, text },
        parts,
        in_reply_to: header_ids(msg.in_reply_to()).into_iter().next(),
        references: header_ids(msg.references()),
    }
}

/// Build the subtree rooted at `msg.parts[index]`.
fn build_part(
    msg: &mail_parser::Message<'_>,
    index: usize,
    depth: usize,
    inline_part_limit: usize,
) -> Option<MimePart> {
    let part = msg.parts.get(index)?;
    let content_type = content_type_of(part);

    if let PartType::Multipart(children) = &part.body {
        if depth >= MAX_DEPTH {
            tracing::warn!(depth, "Multipart nesting too deep, ignoring subtree");
            return None;
        }
        let children = children
            .iter()
            .filter_map(|&child| build_part(msg, child, depth + 1, inline_part_limit))
            .collect();
        return Some(MimePart::multipart(content_type, children));
    }

    let content_id = part.content_id().map(str::to_string);
    let attachment_id = part
        .headers
        .iter()
        .find(|h| h.name.as_str().eq_ignore_ascii_case("X-Attachment-Id"))
        .and_then(|h| h.value.as_text())
        .map(str::to_string);
    let mut filename = part
        .attachment_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let kind = classify(part, &content_type, filename.is_some(), content_id.is_some());
    if kind == PartKind::InlineImage && filename.is_none() {
        filename = Some(INLINE_PLACEHOLDER_NAME.to_string());
    }

    let mut node = MimePart::leaf(content_type, kind);
    node.filename = filename;
    node.content_id = content_id;
    node.attachment_id = attachment_id;

    if kind != PartKind::BodyContent {
        let contents = part.contents();
        if contents.len() > inline_part_limit {
            node = node.with_handle(format!("{HANDLE_PREFIX}{index}"));
        } else {
            node = node.with_embedded(encoded_body(msg, part));
        }
    }

    Some(node)
}

/// Body bytes of a part as they appear in the source, with only the
/// Content-Transfer-Encoding left to undo.
///
/// `contents()` would hand back text parts already converted to UTF-8.
fn encoded_body(
    msg: &mail_parser::Message<'_>,
    part: &mail_parser::MessagePart<'_>,
) -> EmbeddedData {
    let Some(raw) = msg
        .raw_message
        .get(part.raw_body_offset()..part.raw_end_offset())
    else {
        return EmbeddedData::binary(part.contents().to_vec());
    };
    let encoding = match part.encoding {
        Encoding::Base64 => TransferEncoding::Base64,
        Encoding::QuotedPrintable => TransferEncoding::QuotedPrintable,
        Encoding::None => TransferEncoding::Binary,
    };
    EmbeddedData::new(encoding, raw.to_vec())
}

/// Decide what a leaf part is for.
fn classify(
    part: &mail_parser::MessagePart<'_>,
    content_type: &str,
    has_filename: bool,
    has_content_id: bool,
) -> PartKind {
    let disposition = part
        .content_disposition()
        .map(|d| d.ctype().to_ascii_lowercase());
    let is_text = matches!(part.body, PartType::Text(_) | PartType::Html(_));
    let is_image = content_type.starts_with("image/");

    match disposition.as_deref() {
        Some("attachment") => PartKind::Attachment,
        _ if !is_text && has_content_id => PartKind::InlineImage,
        Some("inline") if is_image => PartKind::InlineImage,
        _ if has_filename => PartKind::Attachment,
        _ if matches!(part.body, PartType::Message(_)) => PartKind::Attachment,
        _ => PartKind::BodyContent,
    }
}

/// Lowercase `type/subtype` of a part, defaulting like RFC 2045.
fn content_type_of(part: &mail_parser::MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| match part.body {
            PartType::Html(_) => "text/html".to_string(),
            PartType::Text(_) => "text/plain".to_string(),
            PartType::Message(_) => "message/rfc822".to_string(),
            _ => "application/octet-stream".to_string(),
        })
        .to_ascii_lowercase()
}

/// Message identifiers from an `In-Reply-To` / `References` header value.
fn header_ids(value: &HeaderValue<'_>) -> Vec<String> {
    match value {
        HeaderValue::Text(id) => vec![id.to_string()],
        HeaderValue::TextList(ids) => ids.iter().map(|id| id.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Build a minimal record when `mail-parser` rejects the message.
fn fallback_record(data: &[u8], sequence: u64) -> MessageRecord {
    let text = decode_bytes(data);
    let (headers, body) = match text.find("\r\n\r\n") {
        Some(pos) if !text[..pos].contains("\n\n") => (&text[..pos], &text[pos + 4..]),
        _ => match text.find("\n\n") {
            Some(pos) => (&text[..pos], &text[pos + 2..]),
            None => (text.as_str(), ""),
        },
    };

    let header = |name: &str| {
        headers.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };

    MessageRecord {
        id: format!("message-{sequence}"),
        date: DateTime::UNIX_EPOCH,
        subject: header("subject").unwrap_or_default(),
        from: EmailAddress::parse(&header("from").unwrap_or_default()),
        to: Vec::new(),
        raw: data.to_vec(),
        body: MessageBody::text(body),
        parts: Vec::new(),
        in_reply_to: None,
        references: Vec::new(),
    }
}

/// Decode raw bytes to a string: UTF-8 first, then Windows-1252 (which accepts every byte).
fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    // Handle BOM
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const INLINE: &[u8] = b"From: Prof X <x@y.edu>\r\n\
To: list@y.edu\r\n\
Subject: Update\r\n\
Date: Tue, 12 Aug 2025 10:00:00 +0000\r\n\
Message-ID: <m1@y.edu>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Look: <img src=\"cid:abc123\"></p>\r\n\
--b1\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-ID: <abc123>\r\n\
Content-Disposition: inline\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--b1\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--b1--\r\n";

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let bare = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(bare), bare);
    }

    #[test]
    fn test_parse_headers() {
        let record = parse_message(INLINE, 0, usize::MAX);
        assert_eq!(record.id, "m1@y.edu");
        assert_eq!(record.subject, "Update");
        assert_eq!(record.from.address, "x@y.edu");
        assert_eq!(record.from.display_name, "Prof X");
        assert_eq!(record.to[0].address, "list@y.edu");
        assert_eq!(record.date.format("%Y-%m-%d").to_string(), "2025-08-12");
        assert_eq!(record.raw, INLINE);
    }

    #[test]
    fn test_parse_body_and_parts() {
        let record = parse_message(INLINE, 0, usize::MAX);
        assert!(record.body.html.as_deref().unwrap().contains("cid:abc123"));

        let kinds: Vec<PartKind> = record.parts.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PartKind::BodyContent, PartKind::InlineImage, PartKind::Attachment]
        );

        let image = &record.parts[1];
        assert_eq!(image.filename.as_deref(), Some(INLINE_PLACEHOLDER_NAME));
        assert_eq!(image.reference_id().as_deref(), Some("abc123"));
        let bytes = image.body.embedded.as_ref().unwrap().decode().unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));

        let pdf = &record.parts[2];
        assert_eq!(pdf.filename.as_deref(), Some("report.pdf"));
        assert_eq!(pdf.content_type, "application/pdf");
    }

    #[test]
    fn test_large_parts_get_handles() {
        let record = parse_message(INLINE, 0, 4);
        let pdf = &record.parts[2];
        assert!(pdf.body.embedded.is_none());
        let handle = pdf.body.handle.as_deref().unwrap();
        assert!(handle.starts_with("part:"));
        assert_eq!(extract_part(INLINE, handle).unwrap(), b"%PDF-1.4");
    }

    const LATIN1: &[u8] = b"From: Prof X <x@y.edu>\r\n\
Subject: Figures\r\n\
Date: Tue, 12 Aug 2025 10:00:00 +0000\r\n\
Message-ID: <c1@y.edu>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b2\"\r\n\
\r\n\
--b2\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
See attached.\r\n\
--b2\r\n\
Content-Type: text/csv; charset=windows-1252; name=\"prices.csv\"\r\n\
Content-Disposition: attachment; filename=\"prices.csv\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
Y2Fm6SwxDQo=\r\n\
--b2\r\n\
Content-Type: text/plain; charset=iso-8859-1; name=\"notes.txt\"\r\n\
Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
na=EFve=\r\n caf=E9\r\n\
--b2--\r\n";

    fn attachment_bytes(record: &MessageRecord, name: &str) -> Vec<u8> {
        let part = record
            .parts
            .iter()
            .find(|p| p.filename.as_deref() == Some(name))
            .unwrap();
        part.body.embedded.as_ref().unwrap().decode().unwrap()
    }

    #[test]
    fn test_text_attachments_keep_source_bytes() {
        let record = parse_message(LATIN1, 0, usize::MAX);
        assert_eq!(attachment_bytes(&record, "prices.csv"), b"caf\xe9,1\r\n");
        assert_eq!(attachment_bytes(&record, "notes.txt"), b"na\xefve caf\xe9");
    }

    #[test]
    fn test_extract_text_part_keeps_source_bytes() {
        let record = parse_message(LATIN1, 0, 0);
        let csv = record
            .parts
            .iter()
            .find(|p| p.filename.as_deref() == Some("prices.csv"))
            .unwrap();
        let handle = csv.body.handle.as_deref().unwrap();
        assert_eq!(extract_part(LATIN1, handle).unwrap(), b"caf\xe9,1\r\n");
    }

    #[test]
    fn test_extract_part_rejects_bad_handle() {
        assert!(extract_part(INLINE, "nope").is_err());
        assert!(extract_part(INLINE, "part:99").is_err());
    }

    #[test]
    fn test_plain_message_has_no_parts_to_extract() {
        let raw = b"From: a@b.com\nSubject: Hi\nMessage-ID: <p1@b.com>\n\nJust text\n";
        let record = parse_message(raw, 3, usize::MAX);
        assert_eq!(record.body.html, None);
        assert_eq!(record.body.text.as_deref().map(str::trim), Some("Just text"));
        assert!(record.parts.iter().all(|p| p.kind == PartKind::BodyContent));
    }

    #[test]
    fn test_missing_message_id_is_synthesized() {
        let raw = b"From: a@b.com\nSubject: Hi\n\nBody\n";
        let record = parse_message(raw, 7, usize::MAX);
        assert_eq!(record.id, "message-7");
    }
}
