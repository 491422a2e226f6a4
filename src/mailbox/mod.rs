//! Mailbox access: the search and part-fetch capability the archive pipeline consumes.

pub mod mbox;
pub mod threading;

use crate::error::Result;
use crate::model::message::MessageThread;
use crate::query::SearchSpec;

pub use mbox::MboxMailbox;

/// Threads returned by one search.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Matching threads, newest first, at most `limit` of them.
    pub threads: Vec<MessageThread>,
    /// More threads matched than `limit` allowed.
    pub truncated: bool,
}

/// A searchable mailbox.
///
/// Calls are blocking; the pipeline makes them one at a time.
pub trait Mailbox {
    /// Return up to `limit` threads containing at least one message matching `spec`.
    ///
    /// Threads are returned whole: they may contain messages from other
    /// senders or outside the window.
    fn search(&mut self, spec: &SearchSpec, limit: usize) -> Result<SearchResult>;

    /// Fetch the bytes of a part that only carries a handle.
    fn fetch_part(&mut self, message_id: &str, handle: &str) -> Result<Vec<u8>>;
}
