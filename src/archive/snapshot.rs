//! HTML snapshot rendering.
//!
//! [`render`] is a pure function of the message, its stored parts, and the
//! render options. It never touches the store or the clock.

use chrono::{DateTime, FixedOffset, Utc};

use super::resolver::{ContentIdMap, ResolvedAttachment};
use crate::model::message::MessageRecord;

/// Display format for dates in the header and footer.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

const STYLE: &str = "body { font-family: sans-serif; margin: 2em; }\n\
.mailsnap-header p { margin: 0.2em 0; }\n\
.mailsnap-footer { color: #666; font-size: 0.85em; }\n\
img { max-width: 100%; }";

/// Inputs to [`render`] that do not come from the message.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// When the snapshot was taken, shown in the footer.
    pub archived_at: DateTime<Utc>,
    /// Offset dates are shown in.
    pub offset: FixedOffset,
    /// Show the `To:` line.
    pub include_recipients: bool,
}

/// Render the snapshot document for `message`.
pub fn render(
    message: &MessageRecord,
    attachments: &[ResolvedAttachment],
    cid_map: &ContentIdMap,
    options: &RenderOptions,
) -> String {
    let subject = escape_html(&message.subject);
    let mut out = String::with_capacity(4096);

    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{subject}</title>\n"));
    out.push_str(&format!("<style>\n{STYLE}\n</style>\n</head>\n<body>\n"));

    // ── Header ──
    out.push_str("<div class=\"mailsnap-header\">\n");
    header_line(&mut out, "From", &escape_html(&message.from.display()));
    if options.include_recipients && !message.to.is_empty() {
        let to = message
            .to
            .iter()
            .map(|a| escape_html(&a.display()))
            .collect::<Vec<_>>()
            .join(", ");
        header_line(&mut out, "To", &to);
    }
    let date = message.date.with_timezone(&options.offset);
    header_line(&mut out, "Date", &date.format(DATE_FORMAT).to_string());
    header_line(&mut out, "Subject", &subject);
    out.push_str("</div>\n<hr>\n");

    // ── Body ──
    out.push_str("<div class=\"mailsnap-body\">\n");
    out.push_str(&replace_cids(&body_html(message), cid_map));
    out.push_str("\n</div>\n");

    // ── Attachments ──
    if !attachments.is_empty() {
        out.push_str("<hr>\n<div class=\"mailsnap-attachments\">\n<p><strong>Attachments:</strong></p>\n<ul>\n");
        for attachment in attachments {
            out.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                escape_html(&attachment.locator),
                escape_html(&attachment.stored_name)
            ));
        }
        out.push_str("</ul>\n</div>\n");
    }

    // ── Footer ──
    let archived = options.archived_at.with_timezone(&options.offset);
    out.push_str(&format!(
        "<hr>\n<p class=\"mailsnap-footer\">Archived on {} from message {}</p>\n",
        archived.format(DATE_FORMAT),
        escape_html(&message.id)
    ));
    out.push_str("</body>\n</html>\n");
    out
}

fn header_line(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!("<p><strong>{label}:</strong> {value}</p>\n"));
}

/// Escape text for use in HTML content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Replace every `cid:<token>` whose token is in `cid_map` with its reference.
///
/// A token ends at a quote, `)`, `>`, `<`, whitespace, or the end of input.
/// Unknown tokens are left untouched.
pub fn replace_cids(html: &str, cid_map: &ContentIdMap) -> String {
    const PREFIX: &str = "cid:";

    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(pos) = find_ascii_ci(rest, PREFIX) {
        let after = &rest[pos + PREFIX.len()..];
        let token_len = after
            .find(|c: char| matches!(c, '"' | '\'' | ')' | '>' | '<') || c.is_whitespace())
            .unwrap_or(after.len());
        let token = &after[..token_len];

        out.push_str(&rest[..pos]);
        match cid_map.get(token) {
            Some(resolved) if !token.is_empty() => out.push_str(&escape_html(&resolved.reference)),
            _ => out.push_str(&rest[pos..pos + PREFIX.len() + token_len]),
        }
        rest = &after[token_len..];
    }

    out.push_str(rest);
    out
}

/// The message body as an HTML fragment.
fn body_html(message: &MessageRecord) -> String {
    match message.body.html.as_deref() {
        Some(html) if has_markup(html) => body_fragment(html).to_string(),
        Some(plain) => preformatted(plain),
        None => preformatted(message.body.text.as_deref().unwrap_or_default()),
    }
}

fn preformatted(text: &str) -> String {
    format!(
        "<pre style=\"white-space: pre-wrap\">{}</pre>",
        escape_html(text)
    )
}

/// Content of the `<body>` element, or the whole input when there is none.
fn body_fragment(html: &str) -> &str {
    let Some(open) = find_ascii_ci(html, "<body") else {
        return html;
    };
    let Some(open_end) = html[open..].find('>') else {
        return html;
    };
    let start = open + open_end + 1;
    let end = rfind_ascii_ci(&html[start..], "</body")
        .map(|pos| start + pos)
        .unwrap_or(html.len());
    html[start..end].trim()
}

/// Whether `text` contains anything that looks like a tag.
fn has_markup(text: &str) -> bool {
    text.as_bytes()
        .windows(2)
        .any(|w| w[0] == b'<' && (w[1].is_ascii_alphabetic() || w[1] == b'/' || w[1] == b'!'))
}

/// Byte offset of the first ASCII-case-insensitive match of `needle`.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.len() > h.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Byte offset of the last ASCII-case-insensitive match of `needle`.
fn rfind_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.len() > h.len() {
        return None;
    }
    (0..=h.len() - n.len())
        .rev()
        .find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}
