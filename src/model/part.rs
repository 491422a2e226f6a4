//! MIME part tree.
//!
//! Parts are classified once, when the tree is built, into a [`PartKind`].
//! Everything downstream matches on the kind instead of re-inspecting
//! filenames or content types.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// MIME base64 as found in the wild: padding optional, stray trailing bits accepted.
const MIME_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// What a leaf part is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartKind {
    /// A file the sender attached.
    Attachment,
    /// An inline resource (usually an image) referenced from the body.
    InlineImage,
    /// Text or container content that belongs to the body itself.
    BodyContent,
}

/// Transfer encoding of embedded part bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEncoding {
    /// Already decoded.
    Binary,
    /// Standard base64, possibly with line breaks.
    Base64,
    /// MIME quoted-printable.
    QuotedPrintable,
    /// URL-safe base64 without padding (as returned by web mail APIs).
    Base64Url,
}

/// Part bytes carried inside the message itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedData {
    pub encoding: TransferEncoding,
    pub data: Vec<u8>,
}

impl EmbeddedData {
    pub fn new(encoding: TransferEncoding, data: Vec<u8>) -> Self {
        Self { encoding, data }
    }

    /// Already-decoded bytes.
    pub fn binary(data: Vec<u8>) -> Self {
        Self {
            encoding: TransferEncoding::Binary,
            data,
        }
    }

    /// Decode into raw bytes.
    pub fn decode(&self) -> crate::error::Result<Vec<u8>> {
        match self.encoding {
            TransferEncoding::Binary => Ok(self.data.clone()),
            TransferEncoding::Base64 => {
                let compact: Vec<u8> = self
                    .data
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                MIME_BASE64
                    .decode(compact)
                    .map_err(|e| crate::error::SnapError::Mime(format!("base64: {e}")))
            }
            TransferEncoding::QuotedPrintable => {
                mail_parser::decoders::quoted_printable::quoted_printable_decode(&self.data)
                    .ok_or_else(|| {
                        crate::error::SnapError::Mime("Invalid quoted-printable data".into())
                    })
            }
            TransferEncoding::Base64Url => {
                let trimmed: Vec<u8> = self
                    .data
                    .iter()
                    .copied()
                    .filter(|&b| b != b'=' && !b.is_ascii_whitespace())
                    .collect();
                base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .decode(trimmed)
                    .map_err(|e| crate::error::SnapError::Mime(format!("base64url: {e}")))
            }
        }
    }
}

/// Where a part's bytes can be obtained.
///
/// A part may carry its bytes, a handle for fetching them later, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartBody {
    pub embedded: Option<EmbeddedData>,
    pub handle: Option<String>,
}

/// One node of a message's MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Lowercase `type/subtype`.
    pub content_type: String,
    /// Declared filename, if any.
    pub filename: Option<String>,
    pub kind: PartKind,
    /// `Content-ID` header value, as written (may include angle brackets).
    pub content_id: Option<String>,
    /// `X-Attachment-Id` header value, used when `Content-ID` is absent.
    pub attachment_id: Option<String>,
    pub body: PartBody,
    pub children: Vec<MimePart>,
}

impl MimePart {
    /// A leaf part with no bytes attached yet.
    pub fn leaf(content_type: impl Into<String>, kind: PartKind) -> Self {
        Self {
            content_type: content_type.into().to_ascii_lowercase(),
            filename: None,
            kind,
            content_id: None,
            attachment_id: None,
            body: PartBody::default(),
            children: Vec::new(),
        }
    }

    /// A container part (`multipart/*`).
    pub fn multipart(content_type: impl Into<String>, children: Vec<MimePart>) -> Self {
        Self {
            children,
            ..Self::leaf(content_type, PartKind::BodyContent)
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn with_attachment_id(mut self, attachment_id: impl Into<String>) -> Self {
        self.attachment_id = Some(attachment_id.into());
        self
    }

    pub fn with_embedded(mut self, embedded: EmbeddedData) -> Self {
        self.body.embedded = Some(embedded);
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.body.handle = Some(handle.into());
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The MIME subtype (`png` for `image/png`).
    pub fn subtype(&self) -> &str {
        self.content_type
            .split_once('/')
            .map(|(_, sub)| sub)
            .unwrap_or("")
    }

    /// Content identifier with angle brackets stripped, falling back to the
    /// attachment identifier. Blank identifiers count as absent.
    pub fn reference_id(&self) -> Option<String> {
        [self.content_id.as_deref(), self.attachment_id.as_deref()]
            .into_iter()
            .flatten()
            .map(strip_angle_brackets)
            .find(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// `<abc@host>` → `abc@host`.
pub fn strip_angle_brackets(s: &str) -> &str {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix('<').unwrap_or(trimmed);
    trimmed.strip_suffix('>').unwrap_or(trimmed).trim()
}
