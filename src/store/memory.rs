//! In-memory document store.
//!
//! Used for `--dry-run` and in tests. Unlike [`super::DirectoryStore`] it keeps
//! duplicate names side by side, the way hosted document stores do.

use std::collections::{BTreeMap, HashSet};

use super::{encode_locator, ContainerId, DocumentStore, StoredFile};
use crate::error::{Result, SnapError};

/// A file held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub file: StoredFile,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Document store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Container id → (name, files in creation order).
    containers: BTreeMap<String, (String, Vec<MemoryFile>)>,
    next_id: u64,
    /// File names whose creation fails.
    failing: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create_file` call for `name` fail.
    pub fn fail_on(&mut self, name: impl Into<String>) {
        self.failing.insert(name.into());
    }

    /// Files in a container, in creation order.
    pub fn files(&self, container: &ContainerId) -> &[MemoryFile] {
        self.containers
            .get(&container.id)
            .map(|(_, files)| files.as_slice())
            .unwrap_or(&[])
    }

    /// Names of the files in a container, in creation order.
    pub fn names(&self, container: &ContainerId) -> Vec<String> {
        self.files(container)
            .iter()
            .map(|f| f.file.name.clone())
            .collect()
    }

    /// Number of containers.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

impl DocumentStore for MemoryStore {
    fn get_or_create_container(&mut self, name: &str) -> Result<ContainerId> {
        if let Some((id, _)) = self.containers.iter().find(|(_, (n, _))| n == name) {
            return Ok(ContainerId {
                id: id.clone(),
                name: name.to_string(),
            });
        }
        let id = self.next_id("container");
        self.containers
            .insert(id.clone(), (name.to_string(), Vec::new()));
        Ok(ContainerId {
            id,
            name: name.to_string(),
        })
    }

    fn open_container(&mut self, id: &str) -> Result<ContainerId> {
        self.containers
            .get(id)
            .map(|(name, _)| ContainerId {
                id: id.to_string(),
                name: name.clone(),
            })
            .ok_or_else(|| SnapError::ContainerNotFound(id.to_string()))
    }

    fn find_files(&self, container: &ContainerId, name: &str) -> Result<Vec<StoredFile>> {
        Ok(self
            .files(container)
            .iter()
            .filter(|f| f.file.name == name)
            .map(|f| f.file.clone())
            .collect())
    }

    fn create_file(
        &mut self,
        container: &ContainerId,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredFile> {
        if self.failing.contains(name) {
            return Err(SnapError::Store(format!("Refusing to store '{name}'")));
        }
        if !self.containers.contains_key(&container.id) {
            return Err(SnapError::ContainerNotFound(container.id.clone()));
        }
        let id = self.next_id("file");
        let file = StoredFile {
            locator: format!("{}#{}", encode_locator(name), id),
            id,
            name: name.to_string(),
            description: None,
        };
        if let Some((_, files)) = self.containers.get_mut(&container.id) {
            files.push(MemoryFile {
                file: file.clone(),
                content_type: content_type.to_string(),
                data: data.to_vec(),
            });
        }
        Ok(file)
    }

    fn set_description(
        &mut self,
        container: &ContainerId,
        file: &StoredFile,
        description: &str,
    ) -> Result<()> {
        let entry = self
            .containers
            .get_mut(&container.id)
            .and_then(|(_, files)| files.iter_mut().find(|f| f.file.id == file.id))
            .ok_or_else(|| SnapError::Store(format!("Unknown file '{}'", file.id)))?;
        entry.file.description = Some(description.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_kept() {
        let mut store = MemoryStore::new();
        let c = store.get_or_create_container("box").unwrap();
        store.create_file(&c, "a.txt", "text/plain", b"1").unwrap();
        store.create_file(&c, "a.txt", "text/plain", b"2").unwrap();
        assert_eq!(store.find_files(&c, "a.txt").unwrap().len(), 2);
        assert_eq!(store.container_count(), 1);
    }

    #[test]
    fn test_injected_failure() {
        let mut store = MemoryStore::new();
        let c = store.get_or_create_container("box").unwrap();
        store.fail_on("bad.pdf");
        assert!(matches!(
            store.create_file(&c, "bad.pdf", "application/pdf", b""),
            Err(SnapError::Store(_))
        ));
        assert!(store.files(&c).is_empty());
    }

    #[test]
    fn test_description_set() {
        let mut store = MemoryStore::new();
        let c = store.get_or_create_container("box").unwrap();
        let file = store.create_file(&c, "a.txt", "text/plain", b"1").unwrap();
        store.set_description(&c, &file, "desc").unwrap();
        let found = store.find_files(&c, "a.txt").unwrap();
        assert_eq!(found[0].description.as_deref(), Some("desc"));
    }
}
