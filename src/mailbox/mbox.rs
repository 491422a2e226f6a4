//! A local mailbox backed by MBOX and `.eml` files.
//!
//! Opening the mailbox parses every message once and keeps only a light
//! header index (no raw bytes, no parts). A search re-reads the messages of
//! the matching threads from disk and returns full [`MessageRecord`]s.
//! Parts larger than the configured limit are handed out by handle and read
//! back on demand through a small LRU cache of raw messages.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use lru::LruCache;
use tracing::{debug, info, warn};

use crate::config::MailboxConfig;
use crate::error::{Result, SnapError};
use crate::model::message::{MessageBody, MessageRecord, MessageThread};
use crate::parser::mbox::{read_message_at, MboxParser};
use crate::parser::mime;
use crate::query::SearchSpec;

use super::threading::group_threads;
use super::{Mailbox, SearchResult};

/// Where a message lives on disk.
#[derive(Debug, Clone)]
struct Location {
    path: PathBuf,
    offset: u64,
    length: u64,
}

/// Mailbox over one MBOX file, one `.eml` file, or a directory of them.
pub struct MboxMailbox {
    /// Header-only records (empty `raw`, `body`, and `parts`).
    index: Vec<MessageRecord>,
    locations: Vec<Location>,
    by_id: HashMap<String, usize>,
    cache: LruCache<usize, Vec<u8>>,
    inline_part_limit: usize,
    offset: FixedOffset,
}

impl MboxMailbox {
    /// Open and index a mailbox.
    ///
    /// `offset` decides which calendar day a message belongs to when
    /// evaluating a search window.
    pub fn open(path: impl AsRef<Path>, config: &MailboxConfig, offset: FixedOffset) -> Result<Self> {
        Self::open_with_progress(path, config, offset, None)
    }

    /// Like [`MboxMailbox::open`], reporting `(bytes_done, bytes_total)` per file.
    pub fn open_with_progress(
        path: impl AsRef<Path>,
        config: &MailboxConfig,
        offset: FixedOffset,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SnapError::MailboxNotFound(path.to_path_buf()));
        }

        let cache_size = NonZeroUsize::new(config.fetch_cache_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let mut mailbox = Self {
            index: Vec::new(),
            locations: Vec::new(),
            by_id: HashMap::new(),
            cache: LruCache::new(cache_size),
            inline_part_limit: config.inline_part_limit,
            offset,
        };

        for file in mailbox_files(path)? {
            if is_eml(&file) {
                mailbox.index_eml(&file, config)?;
            } else {
                mailbox.index_mbox(&file, config, progress)?;
            }
        }

        info!(
            path = %path.display(),
            messages = mailbox.index.len(),
            "Indexed mailbox"
        );
        Ok(mailbox)
    }

    /// Number of distinct messages indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn index_mbox(
        &mut self,
        path: &Path,
        config: &MailboxConfig,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<()> {
        let parser = MboxParser::new(path, config.max_message_size)?;
        let base = self.index.len();
        let mut found = Vec::new();
        parser.parse(
            &mut |offset, length, raw| {
                let sequence = (base + found.len()) as u64;
                found.push((mime::parse_message(raw, sequence, 0), offset, length));
                true
            },
            progress,
        )?;

        for (record, offset, length) in found {
            self.push(
                record,
                Location {
                    path: path.to_path_buf(),
                    offset,
                    length,
                },
            );
        }
        Ok(())
    }

    fn index_eml(&mut self, path: &Path, config: &MailboxConfig) -> Result<()> {
        let raw = std::fs::read(path).map_err(|e| SnapError::io(path, e))?;
        if raw.len() > config.max_message_size {
            warn!(path = %path.display(), size = raw.len(), "Message exceeds maximum size, skipping");
            return Ok(());
        }
        let record = mime::parse_message(&raw, self.index.len() as u64, 0);
        self.push(
            record,
            Location {
                path: path.to_path_buf(),
                offset: 0,
                length: raw.len() as u64,
            },
        );
        Ok(())
    }

    /// Add a header-only record, dropping duplicates of an already indexed message.
    fn push(&mut self, mut record: MessageRecord, location: Location) {
        if self.by_id.contains_key(&record.id) {
            debug!(message_id = %record.id, "Duplicate message, keeping first copy");
            return;
        }
        record.raw = Vec::new();
        record.body = MessageBody::default();
        record.parts = Vec::new();

        self.by_id.insert(record.id.clone(), self.index.len());
        self.index.push(record);
        self.locations.push(location);
    }

    /// Raw bytes of an indexed message, through the cache.
    fn raw_message(&mut self, idx: usize) -> Result<Vec<u8>> {
        if let Some(raw) = self.cache.get(&idx) {
            return Ok(raw.clone());
        }
        let location = &self.locations[idx];
        debug!(
            path = %location.path.display(),
            offset = location.offset,
            length = location.length,
            "Reading message"
        );
        let raw = read_message_at(&location.path, location.offset, location.length)?;
        self.cache.put(idx, raw.clone());
        Ok(raw)
    }

    /// Full record of an indexed message.
    fn load(&mut self, idx: usize) -> Result<MessageRecord> {
        let raw = self.raw_message(idx)?;
        let mut record = mime::parse_message(&raw, idx as u64, self.inline_part_limit);
        // Keep the indexed id so handles resolve even for synthesized ids.
        record.id = self.index[idx].id.clone();
        Ok(record)
    }
}

impl Mailbox for MboxMailbox {
    fn search(&mut self, spec: &SearchSpec, limit: usize) -> Result<SearchResult> {
        let offset = self.offset;
        let matching: Vec<Vec<usize>> = group_threads(&self.index)
            .into_iter()
            .filter(|members| {
                members
                    .iter()
                    .any(|&i| spec.matches(&self.index[i], offset))
            })
            .collect();

        let truncated = matching.len() > limit;
        let mut threads = Vec::with_capacity(matching.len().min(limit));
        for members in matching.into_iter().take(limit) {
            let messages = members
                .into_iter()
                .map(|idx| self.load(idx))
                .collect::<Result<Vec<_>>>()?;
            threads.push(MessageThread {
                id: messages[0].id.clone(),
                messages,
            });
        }

        debug!(
            query = %spec.expression(),
            threads = threads.len(),
            truncated,
            "Search complete"
        );
        Ok(SearchResult { threads, truncated })
    }

    fn fetch_part(&mut self, message_id: &str, handle: &str) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| SnapError::Fetch {
            message_id: message_id.to_string(),
            handle: handle.to_string(),
            reason,
        };
        let idx = *self
            .by_id
            .get(message_id)
            .ok_or_else(|| fetch_error("unknown message".to_string()))?;
        let raw = self.raw_message(idx)?;
        mime::extract_part(&raw, handle).map_err(|e| fetch_error(e.to_string()))
    }
}

/// Files that make up the mailbox at `path`, in a stable order.
fn mailbox_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path).map_err(|e| SnapError::io(path, e))? {
        let entry = entry.map_err(|e| SnapError::io(path, e))?;
        let file = entry.path();
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if file.is_file() && matches!(ext.as_deref(), Some("mbox" | "mbx" | "eml")) {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

fn is_eml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("eml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    use crate::query::plan_range;

    const MBOX: &str = "From x@y.edu Tue Aug 12 10:00:00 2025\n\
From: Prof X <x@y.edu>\n\
Subject: Update\n\
Date: Tue, 12 Aug 2025 10:00:00 +0000\n\
Message-ID: <m1@y.edu>\n\
\n\
Hello all\n\
\n\
From z@y.edu Tue Aug 12 11:00:00 2025\n\
From: Zed <z@y.edu>\n\
Subject: Re: Update\n\
Date: Tue, 12 Aug 2025 11:00:00 +0000\n\
Message-ID: <m2@y.edu>\n\
In-Reply-To: <m1@y.edu>\n\
References: <m1@y.edu>\n\
\n\
Thanks\n\
\n\
From x@y.edu Mon Sep 01 10:00:00 2025\n\
From: Prof X <x@y.edu>\n\
Subject: Later\n\
Date: Mon, 01 Sep 2025 10:00:00 +0000\n\
Message-ID: <m3@y.edu>\n\
\n\
Outside the window\n";

    fn open(contents: &str) -> (tempfile::TempDir, MboxMailbox) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.mbox");
        std::fs::write(&path, contents).unwrap();
        let mailbox =
            MboxMailbox::open(&path, &MailboxConfig::default(), chrono::Utc.fix()).unwrap();
        (dir, mailbox)
    }

    #[test]
    fn test_index_drops_bodies() {
        let (_dir, mailbox) = open(MBOX);
        assert_eq!(mailbox.len(), 3);
        assert!(mailbox.index.iter().all(|r| r.raw.is_empty()));
    }

    #[test]
    fn test_search_returns_whole_thread() {
        let (_dir, mut mailbox) = open(MBOX);
        let spec = plan_range("2025-08-11", "2025-08-13", Some("x@y.edu"), None).unwrap();
        let result = mailbox.search(&spec, 10).unwrap();

        assert!(!result.truncated);
        assert_eq!(result.threads.len(), 1);
        let thread = &result.threads[0];
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1].from.address, "z@y.edu");
        assert!(thread.messages[0].raw.starts_with(b"From: Prof X"));
    }

    #[test]
    fn test_search_limit_truncates() {
        let (_dir, mut mailbox) = open(MBOX);
        let spec = plan_range("2025-01-01", "2026-01-01", Some("x@y.edu"), None).unwrap();
        let result = mailbox.search(&spec, 1).unwrap();
        assert!(result.truncated);
        assert_eq!(result.threads.len(), 1);
        // Newest thread first
        assert_eq!(result.threads[0].messages[0].subject, "Later");
    }

    #[test]
    fn test_subject_filter() {
        let (_dir, mut mailbox) = open(MBOX);
        let spec =
            plan_range("2025-01-01", "2026-01-01", Some("x@y.edu"), Some("later")).unwrap();
        let result = mailbox.search(&spec, 10).unwrap();
        assert_eq!(result.threads.len(), 1);
        assert_eq!(result.threads[0].id, "m3@y.edu");
    }

    #[test]
    fn test_fetch_unknown_message() {
        let (_dir, mut mailbox) = open(MBOX);
        assert!(matches!(
            mailbox.fetch_part("nope", "part:1"),
            Err(SnapError::Fetch { .. })
        ));
    }

    #[test]
    fn test_directory_of_eml_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.eml"),
            "From: x@y.edu\nSubject: One\nMessage-ID: <e1@y>\nDate: Tue, 12 Aug 2025 10:00:00 +0000\n\nbody\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let mailbox =
            MboxMailbox::open(dir.path(), &MailboxConfig::default(), chrono::Utc.fix()).unwrap();
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_missing_mailbox() {
        assert!(matches!(
            MboxMailbox::open("/no/such/box", &MailboxConfig::default(), chrono::Utc.fix()),
            Err(SnapError::MailboxNotFound(_))
        ));
    }
}
