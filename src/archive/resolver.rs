//! Content-ID resolver.
//!
//! Stores every extracted part in the destination container and maps each
//! part's content identifier to something the snapshot can reference.

use std::collections::{HashMap, HashSet};

use base64::Engine;
use tracing::{debug, warn};

use super::persist::{place_file, Placement};
use super::sanitize::sanitize;
use super::walker::ExtractedPart;
use super::MessageContext;
use crate::config::{ArchiveConfig, ExistingPolicy, InlineImageMode};
use crate::model::part::{MimePart, PartKind};
use crate::store::{ContainerId, DocumentStore};

/// Declared filenames that say nothing about the part.
const PLACEHOLDER_NAMES: [&str; 5] = ["image", "noname", "unnamed", "untitled", "attachment"];

/// A part that now lives in the container.
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub part: MimePart,
    /// Discovery index of the part within its message.
    pub index: usize,
    /// Name the store used.
    pub stored_name: String,
    /// What the snapshot links to: a `data:` URI or the stored file's locator.
    pub reference: String,
    /// Locator of the stored file.
    pub locator: String,
    pub description: String,
    pub size: usize,
    /// Reused from an earlier run instead of written again.
    pub already_present: bool,
}

/// Content identifier (angle brackets stripped) → stored part.
pub type ContentIdMap = HashMap<String, ResolvedAttachment>;

/// How parts are named, referenced, and re-stored.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub inline_images: InlineImageMode,
    pub on_existing: ExistingPolicy,
}

impl From<&ArchiveConfig> for ResolveOptions {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            inline_images: config.inline_images,
            on_existing: config.on_existing,
        }
    }
}

/// Result of resolving one message's parts.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Stored parts in discovery order.
    pub attachments: Vec<ResolvedAttachment>,
    pub cid_map: ContentIdMap,
    /// Parts the store rejected.
    pub failed: usize,
    pub last_error: Option<String>,
}

/// Store `parts` and build the content-ID map.
///
/// A part the store rejects is logged and counted; the parts before and
/// after it are unaffected.
pub fn resolve(
    parts: Vec<ExtractedPart>,
    ctx: &MessageContext<'_>,
    store: &mut dyn DocumentStore,
    container: &ContainerId,
    options: ResolveOptions,
) -> Resolution {
    let mut resolution = Resolution::default();
    let mut used_names = HashSet::new();
    let description = ctx.description();

    for extracted in parts {
        let name = unique_in_message(&mut used_names, stored_name_for(&extracted, ctx));

        let placement = place_file(
            store,
            container,
            ctx,
            &name,
            &extracted.part.content_type,
            &extracted.bytes,
            options.on_existing,
        );
        let (file, already_present) = match placement {
            Ok(Placement::Created(file)) => (file, false),
            Ok(Placement::Existing(file)) => (file, true),
            Err(e) => {
                warn!(
                    message_id = %ctx.message.id,
                    filename = %name,
                    error = %e,
                    "Failed to store part, skipping"
                );
                resolution.failed += 1;
                resolution.last_error = Some(e.to_string());
                continue;
            }
        };

        let reference = match (extracted.part.kind, options.inline_images) {
            (PartKind::InlineImage, InlineImageMode::Embed) => {
                data_uri(&extracted.part.content_type, &extracted.bytes)
            }
            _ => file.locator.clone(),
        };

        debug!(stored = %file.name, already_present, "Resolved part");
        let resolved = ResolvedAttachment {
            index: extracted.index,
            stored_name: file.name,
            reference,
            locator: file.locator,
            description: description.clone(),
            size: extracted.bytes.len(),
            already_present,
            part: extracted.part,
        };

        if let Some(cid) = resolved.part.reference_id() {
            resolution.cid_map.insert(cid, resolved.clone());
        }
        resolution.attachments.push(resolved);
    }

    resolution
}

/// Name a part will be stored under, before per-message de-duplication.
fn stored_name_for(extracted: &ExtractedPart, ctx: &MessageContext<'_>) -> String {
    let declared = extracted.filename().trim();
    if is_placeholder(declared) {
        format!(
            "{} inline {}-{}.{}",
            ctx.day(),
            ctx.short_id(),
            extracted.index,
            extension_for(&extracted.part)
        )
    } else {
        format!("{} {}", ctx.day(), sanitize_filename(declared))
    }
}

/// `image`, `image.png`, `NONAME` and the like.
fn is_placeholder(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    let stem = match lower.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => lower.as_str(),
    };
    PLACEHOLDER_NAMES.contains(&stem)
}

/// File extension derived from the MIME subtype.
fn extension_for(part: &MimePart) -> String {
    match part.subtype() {
        "jpeg" | "pjpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        "x-icon" | "vnd.microsoft.icon" => "ico".to_string(),
        sub => {
            let cleaned: String = sub
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(10)
                .collect();
            if cleaned.is_empty() {
                "bin".to_string()
            } else {
                cleaned
            }
        }
    }
}

/// Sanitize a declared filename, keeping a short extension intact.
fn sanitize_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !stem.trim().is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{}.{}", sanitize(stem), ext)
        }
        _ => sanitize(filename),
    }
}

/// Add ` (n)` before the extension until `name` is unused in this message.
fn unique_in_message(used: &mut HashSet<String>, name: String) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
        _ => (name.clone(), String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        content_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};

    use crate::model::address::EmailAddress;
    use crate::model::message::{MessageBody, MessageRecord};
    use crate::store::MemoryStore;

    fn message() -> MessageRecord {
        MessageRecord {
            id: "m1abcdefgh@y.edu".into(),
            date: Utc.with_ymd_and_hms(2025, 8, 12, 10, 0, 0).unwrap(),
            subject: "Update".into(),
            from: EmailAddress::new("", "x@y.edu"),
            to: Vec::new(),
            raw: Vec::new(),
            body: MessageBody::default(),
            parts: Vec::new(),
            in_reply_to: None,
            references: Vec::new(),
        }
    }

    fn extracted(part: MimePart, index: usize, bytes: &[u8]) -> ExtractedPart {
        ExtractedPart {
            part,
            index,
            bytes: bytes.to_vec(),
        }
    }

    fn inline_image(cid: &str) -> MimePart {
        MimePart::leaf("image/png", PartKind::InlineImage)
            .with_filename("image")
            .with_content_id(cid)
    }

    fn options(inline_images: InlineImageMode) -> ResolveOptions {
        ResolveOptions {
            inline_images,
            on_existing: ExistingPolicy::Skip,
        }
    }

    #[test]
    fn test_placeholder_names() {
        assert!(is_placeholder("image"));
        assert!(is_placeholder("Image.PNG"));
        assert!(is_placeholder("noname"));
        assert!(is_placeholder("attachment.bin"));
        assert!(!is_placeholder("image-1.png"));
        assert!(!is_placeholder("report.pdf"));
        assert!(!is_placeholder(".image"));
    }

    #[test]
    fn test_extension_for() {
        let ext = |ct: &str| extension_for(&MimePart::leaf(ct, PartKind::InlineImage));
        assert_eq!(ext("image/png"), "png");
        assert_eq!(ext("image/jpeg"), "jpg");
        assert_eq!(ext("image/svg+xml"), "svg");
        assert_eq!(ext("application"), "bin");
    }

    #[test]
    fn test_inline_image_synthesized_and_embedded() {
        let msg = message();
        let ctx = MessageContext::new(&msg, FixedOffset::east_opt(0).unwrap());
        let mut store = MemoryStore::new();
        let container = store.get_or_create_container("box").unwrap();

        let parts = vec![extracted(inline_image("<abc123>"), 0, b"\x89PNG")];
        let res = resolve(parts, &ctx, &mut store, &container, options(InlineImageMode::Embed));

        assert_eq!(res.failed, 0);
        assert_eq!(res.attachments[0].stored_name, "2025-08-12 inline m1abcdef-0.png");
        let entry = &res.cid_map["abc123"];
        assert!(entry.reference.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_link_mode_uses_locator() {
        let msg = message();
        let ctx = MessageContext::new(&msg, FixedOffset::east_opt(0).unwrap());
        let mut store = MemoryStore::new();
        let container = store.get_or_create_container("box").unwrap();

        let parts = vec![extracted(inline_image("abc123"), 0, b"png")];
        let res = resolve(parts, &ctx, &mut store, &container, options(InlineImageMode::Link));
        let entry = &res.cid_map["abc123"];
        assert_eq!(entry.reference, entry.locator);
    }

    #[test]
    fn test_duplicate_names_suffixed() {
        let msg = message();
        let ctx = MessageContext::new(&msg, FixedOffset::east_opt(0).unwrap());
        let mut store = MemoryStore::new();
        let container = store.get_or_create_container("box").unwrap();

        let pdf = || MimePart::leaf("application/pdf", PartKind::Attachment).with_filename("a.pdf");
        let parts = vec![
            extracted(pdf(), 0, b"1"),
            extracted(pdf(), 1, b"2"),
            extracted(pdf(), 2, b"3"),
        ];
        let res = resolve(parts, &ctx, &mut store, &container, options(InlineImageMode::Embed));
        let names: Vec<_> = res.attachments.iter().map(|a| a.stored_name.as_str()).collect();
        assert_eq!(
            names,
            ["2025-08-12 a.pdf", "2025-08-12 a (2).pdf", "2025-08-12 a (3).pdf"]
        );
        assert!(res.cid_map.is_empty());
    }

    #[test]
    fn test_failure_isolated() {
        let msg = message();
        let ctx = MessageContext::new(&msg, FixedOffset::east_opt(0).unwrap());
        let mut store = MemoryStore::new();
        let container = store.get_or_create_container("box").unwrap();
        store.fail_on("2025-08-12 bad.pdf");

        let parts = vec![
            extracted(
                MimePart::leaf("application/pdf", PartKind::Attachment)
                    .with_filename("bad.pdf")
                    .with_content_id("<bad>"),
                0,
                b"x",
            ),
            extracted(inline_image("good"), 1, b"y"),
        ];
        let res = resolve(parts, &ctx, &mut store, &container, options(InlineImageMode::Embed));
        assert_eq!(res.failed, 1);
        assert!(res.last_error.is_some());
        assert_eq!(res.attachments.len(), 1);
        assert!(!res.cid_map.contains_key("bad"));
        assert!(res.cid_map.contains_key("good"));
    }

    #[test]
    fn test_rerun_reuses_existing() {
        let msg = message();
        let ctx = MessageContext::new(&msg, FixedOffset::east_opt(0).unwrap());
        let mut store = MemoryStore::new();
        let container = store.get_or_create_container("box").unwrap();
        let part = || {
            MimePart::leaf("application/pdf", PartKind::Attachment).with_filename("report.pdf")
        };

        let first = resolve(
            vec![extracted(part(), 0, b"x")],
            &ctx,
            &mut store,
            &container,
            options(InlineImageMode::Embed),
        );
        let second = resolve(
            vec![extracted(part(), 0, b"x")],
            &ctx,
            &mut store,
            &container,
            options(InlineImageMode::Embed),
        );
        assert!(!first.attachments[0].already_present);
        assert!(second.attachments[0].already_present);
        assert_eq!(store.files(&container).len(), 1);
    }

    #[test]
    fn test_long_filename_keeps_extension() {
        let long = format!("{}.pdf", "r".repeat(200));
        let name = sanitize_filename(&long);
        assert!(name.ends_with("….pdf"));
        assert_eq!(sanitize_filename("a:b.txt"), "a b.txt");
    }
}
