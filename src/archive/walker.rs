//! MIME part walker: finds extractable parts and acquires their bytes.

use tracing::{debug, warn};

use crate::mailbox::Mailbox;
use crate::model::message::MessageRecord;
use crate::model::part::{MimePart, PartKind};

/// Deepest part nesting the walker descends into.
const MAX_DEPTH: usize = 10;

/// A candidate part together with its bytes.
#[derive(Debug, Clone)]
pub struct ExtractedPart {
    /// The part itself (children are not carried over).
    pub part: MimePart,
    /// Position among the message's candidate parts, in discovery order.
    pub index: usize,
    pub bytes: Vec<u8>,
}

impl ExtractedPart {
    /// Declared filename (candidates always have one).
    pub fn filename(&self) -> &str {
        self.part.filename.as_deref().unwrap_or_default()
    }
}

/// Collect every extractable part of `message`, in tree order.
///
/// A leaf is a candidate when it has a non-empty filename and is not body
/// content. Bytes come from the embedded data first, then from the part
/// handle via [`Mailbox::fetch_part`]. Parts for which neither yields bytes
/// are logged and left out.
pub fn walk(message: &MessageRecord, mailbox: &mut dyn Mailbox) -> Vec<ExtractedPart> {
    let mut walker = Walker {
        message,
        mailbox,
        next_index: 0,
        found: Vec::new(),
    };
    for part in &message.parts {
        walker.visit(part, 1);
    }
    walker.found
}

/// Whether `message` was sent by `target`: exact address match, ignoring case
/// and display name.
pub fn sender_matches(message: &MessageRecord, target: &str) -> bool {
    message.from.same_address(target.trim())
}

struct Walker<'a> {
    message: &'a MessageRecord,
    mailbox: &'a mut dyn Mailbox,
    next_index: usize,
    found: Vec<ExtractedPart>,
}

impl Walker<'_> {
    fn visit(&mut self, part: &MimePart, depth: usize) {
        if !part.is_leaf() {
            if depth >= MAX_DEPTH {
                warn!(
                    message_id = %self.message.id,
                    depth,
                    "Part tree too deep, not descending further"
                );
                return;
            }
            for child in &part.children {
                self.visit(child, depth + 1);
            }
            return;
        }

        let filename = match part.filename.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => return,
        };
        match part.kind {
            PartKind::Attachment | PartKind::InlineImage => {}
            PartKind::BodyContent => return,
        }

        let index = self.next_index;
        self.next_index += 1;

        match self.acquire(part) {
            Some(bytes) => {
                debug!(filename, size = bytes.len(), "Extracted part");
                self.found.push(ExtractedPart {
                    part: MimePart {
                        children: Vec::new(),
                        ..part.clone()
                    },
                    index,
                    bytes,
                });
            }
            None => warn!(
                message_id = %self.message.id,
                filename,
                content_type = %part.content_type,
                "No data for part, skipping"
            ),
        }
    }

    /// Embedded bytes first, then the fetch handle. Empty results count as missing.
    fn acquire(&mut self, part: &MimePart) -> Option<Vec<u8>> {
        if let Some(embedded) = &part.body.embedded {
            match embedded.decode() {
                Ok(bytes) if !bytes.is_empty() => return Some(bytes),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Embedded part data did not decode"),
            }
        }

        let handle = part.body.handle.as_deref()?;
        match self.mailbox.fetch_part(&self.message.id, handle) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                warn!(handle, error = %e, "Failed to fetch part");
                None
            }
        }
    }
}
