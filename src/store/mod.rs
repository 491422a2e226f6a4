//! Destination containers: where snapshots, attachments, and inline images are written.

pub mod directory;
pub mod memory;

use serde::Serialize;

use crate::error::Result;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

/// A folder-like grouping in a document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerId {
    /// Store-specific identifier, usable with [`DocumentStore::open_container`].
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

/// A file that exists in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    /// Store-specific identifier.
    pub id: String,
    /// Name the store actually used (may differ from the requested one on collision).
    pub name: String,
    /// Reference to the file that works from a snapshot stored in the same container.
    pub locator: String,
    /// Description attached to the file, if any.
    pub description: Option<String>,
}

/// A document store with folder-like containers.
///
/// Calls are blocking; the pipeline makes them one at a time.
pub trait DocumentStore {
    /// Find a container by name, creating it when missing.
    fn get_or_create_container(&mut self, name: &str) -> Result<ContainerId>;

    /// Open an existing container by id.
    fn open_container(&mut self, id: &str) -> Result<ContainerId>;

    /// Files in `container` stored under `name`.
    ///
    /// Includes the files the store renamed when `name` was already taken,
    /// so a caller can recognise its own earlier copy among them.
    fn find_files(&self, container: &ContainerId, name: &str) -> Result<Vec<StoredFile>>;

    /// Create a file. Name collisions are resolved by the store.
    fn create_file(
        &mut self,
        container: &ContainerId,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredFile>;

    /// Attach a human-readable description to a file.
    fn set_description(
        &mut self,
        container: &ContainerId,
        file: &StoredFile,
        description: &str,
    ) -> Result<()>;
}

/// Percent-encode a file name for use as a relative URL.
pub fn encode_locator(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'@' | b'+'
            | b'(' | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_locator() {
        assert_eq!(encode_locator("2025-08-12 report.pdf"), "2025-08-12%20report.pdf");
        assert_eq!(encode_locator("a#b%c"), "a%23b%25c");
        assert_eq!(encode_locator("é"), "%C3%A9");
    }
}
