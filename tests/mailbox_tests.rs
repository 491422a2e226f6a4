use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use chrono::{FixedOffset, Offset, Utc};

use mailsnap::config::MailboxConfig;
use mailsnap::mailbox::{Mailbox, MboxMailbox};
use mailsnap::model::part::PartKind;
use mailsnap::query::plan_range;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn utc() -> FixedOffset {
    Utc.fix()
}

#[test]
fn test_open_fixture_mbox() {
    let mailbox = MboxMailbox::open(fixture("thread.mbox"), &MailboxConfig::default(), utc())
        .unwrap();
    assert_eq!(mailbox.len(), 3);
}

#[test]
fn test_search_loads_parts() {
    let mut mailbox =
        MboxMailbox::open(fixture("thread.mbox"), &MailboxConfig::default(), utc()).unwrap();
    let spec = plan_range("2025-08-11", "2025-08-13", Some("x@y.edu"), None).unwrap();
    let result = mailbox.search(&spec, 5).unwrap();

    let first = &result.threads[0].messages[0];
    assert_eq!(first.id, "m1@y.edu");
    let attachment = first
        .parts
        .iter()
        .flat_map(|p| std::iter::once(p).chain(p.children.iter()))
        .find(|p| p.kind == PartKind::Attachment)
        .unwrap();
    assert_eq!(attachment.filename.as_deref(), Some("report.pdf"));
}

#[test]
fn test_large_part_is_fetched_by_handle() {
    let config = MailboxConfig {
        inline_part_limit: 4,
        ..MailboxConfig::default()
    };
    let mut mailbox = MboxMailbox::open(fixture("thread.mbox"), &config, utc()).unwrap();
    let spec = plan_range("2025-08-11", "2025-08-13", Some("x@y.edu"), None).unwrap();
    let result = mailbox.search(&spec, 5).unwrap();

    let first = &result.threads[0].messages[0];
    let handle = first
        .parts
        .iter()
        .flat_map(|p| std::iter::once(p).chain(p.children.iter()))
        .find(|p| p.kind == PartKind::Attachment)
        .and_then(|p| p.body.handle.clone())
        .unwrap();
    let bytes = mailbox.fetch_part(&first.id, &handle).unwrap();
    assert_eq!(bytes, b"%PDF-1.4");
}

#[test]
fn test_directory_mixes_mbox_and_eml() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("a.mbox")
        .write_file(&fixture("window.mbox"))
        .unwrap();
    temp.child("b.eml")
        .write_str(
            "From: x@y.edu\nSubject: Loose\nMessage-ID: <e1@y.edu>\n\
             Date: Tue, 12 Aug 2025 10:00:00 +0000\n\nbody\n",
        )
        .unwrap();

    let mut mailbox =
        MboxMailbox::open(temp.path(), &MailboxConfig::default(), utc()).unwrap();
    assert_eq!(mailbox.len(), 3);

    let spec = plan_range("2025-08-12", "2025-08-13", Some("x@y.edu"), None).unwrap();
    let result = mailbox.search(&spec, 5).unwrap();
    assert_eq!(result.threads.len(), 1);
    assert_eq!(result.threads[0].messages[0].subject, "Loose");
}
