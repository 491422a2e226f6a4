//! Message and thread records handed out by a mailbox.

use chrono::{DateTime, Utc};

use super::address::EmailAddress;
use super::part::MimePart;

/// Structured body of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    /// Rich-text body (from the `text/html` part), if the message has one.
    pub html: Option<String>,
    /// Plain-text body (from the `text/plain` part), if the message has one.
    pub text: Option<String>,
}

impl MessageBody {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            html: None,
            text: Some(text.into()),
        }
    }

    /// The preferred body: HTML when present, otherwise the plain text.
    pub fn preferred(&self) -> &str {
        self.html
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }
}

/// One message as exposed by a mailbox. Read-only to the archive pipeline.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Stable identifier (the `Message-ID` without angle brackets, or a synthetic one).
    pub id: String,
    /// Parsed `Date:` header.
    pub date: DateTime<Utc>,
    /// Decoded subject line.
    pub subject: String,
    /// First `From:` address.
    pub from: EmailAddress,
    /// `To:` recipients.
    pub to: Vec<EmailAddress>,
    /// Exact source bytes of the message (RFC 5322, no MBOX separator).
    pub raw: Vec<u8>,
    pub body: MessageBody,
    /// Top-level parts of the MIME tree, in message order.
    pub parts: Vec<MimePart>,
    /// `In-Reply-To` identifier, used for thread grouping.
    pub in_reply_to: Option<String>,
    /// `References` identifiers, used for thread grouping.
    pub references: Vec<String>,
}

/// A conversation: related messages in date order.
#[derive(Debug, Clone)]
pub struct MessageThread {
    /// Identifier of the thread root (first message's id).
    pub id: String,
    pub messages: Vec<MessageRecord>,
}

impl MessageThread {
    /// Date of the newest message in the thread.
    pub fn last_date(&self) -> Option<DateTime<Utc>> {
        self.messages.iter().map(|m| m.date).max()
    }
}
