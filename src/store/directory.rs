//! Local-filesystem document store.
//!
//! Each container is a subdirectory of the store root. File descriptions are
//! kept in a `.descriptions.json` manifest inside the container, keyed by the
//! stored file name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{encode_locator, ContainerId, DocumentStore, StoredFile};
use crate::error::{Result, SnapError};

/// Manifest file holding per-file descriptions.
const MANIFEST_NAME: &str = ".descriptions.json";

/// Document store rooted at a local directory.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| SnapError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing a container.
    pub fn container_dir(&self, container: &ContainerId) -> PathBuf {
        self.root.join(&container.id)
    }

    fn manifest_path(&self, container: &ContainerId) -> PathBuf {
        self.container_dir(container).join(MANIFEST_NAME)
    }

    fn load_manifest(&self, container: &ContainerId) -> Result<BTreeMap<String, String>> {
        let path = self.manifest_path(container);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| SnapError::io(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| SnapError::Store(format!("{}: {e}", path.display())))
    }

    fn save_manifest(
        &self,
        container: &ContainerId,
        manifest: &BTreeMap<String, String>,
    ) -> Result<()> {
        let path = self.manifest_path(container);
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| SnapError::Store(e.to_string()))?;
        fs::write(&path, content).map_err(|e| SnapError::io(&path, e))
    }

    fn stored_file(&self, name: &str, description: Option<String>) -> StoredFile {
        StoredFile {
            id: name.to_string(),
            name: name.to_string(),
            locator: encode_locator(name),
            description,
        }
    }
}

impl DocumentStore for DirectoryStore {
    fn get_or_create_container(&mut self, name: &str) -> Result<ContainerId> {
        let id = directory_name(name);
        let dir = self.root.join(&id);
        if !dir.is_dir() {
            fs::create_dir_all(&dir).map_err(|e| SnapError::io(&dir, e))?;
            debug!(container = %dir.display(), "Created container");
        }
        Ok(ContainerId {
            id,
            name: name.to_string(),
        })
    }

    fn open_container(&mut self, id: &str) -> Result<ContainerId> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(SnapError::ContainerNotFound(id.to_string()));
        }
        if !self.root.join(id).is_dir() {
            return Err(SnapError::ContainerNotFound(id.to_string()));
        }
        Ok(ContainerId {
            id: id.to_string(),
            name: id.to_string(),
        })
    }

    fn find_files(&self, container: &ContainerId, name: &str) -> Result<Vec<StoredFile>> {
        if name.is_empty() || name == MANIFEST_NAME {
            return Ok(Vec::new());
        }
        let dir = self.container_dir(container);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| SnapError::io(&dir, e))? {
            let entry = entry.map_err(|e| SnapError::io(&dir, e))?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(n) = variant_number(name, &file_name) {
                if entry.path().is_file() {
                    found.push((n, file_name));
                }
            }
        }
        if found.is_empty() {
            return Ok(Vec::new());
        }
        found.sort();

        let mut manifest = self.load_manifest(container)?;
        Ok(found
            .into_iter()
            .map(|(_, file_name)| {
                let description = manifest.remove(&file_name);
                self.stored_file(&file_name, description)
            })
            .collect())
    }

    fn create_file(
        &mut self,
        container: &ContainerId,
        name: &str,
        _content_type: &str,
        data: &[u8],
    ) -> Result<StoredFile> {
        let dir = self.container_dir(container);
        if !dir.is_dir() {
            return Err(SnapError::ContainerNotFound(container.id.clone()));
        }
        let path = unique_path(&dir.join(name));
        fs::write(&path, data).map_err(|e| SnapError::io(&path, e))?;

        let stored_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
            .to_string();
        debug!(file = %path.display(), bytes = data.len(), "Stored file");
        Ok(self.stored_file(&stored_name, None))
    }

    fn set_description(
        &mut self,
        container: &ContainerId,
        file: &StoredFile,
        description: &str,
    ) -> Result<()> {
        let mut manifest = self.load_manifest(container)?;
        manifest.insert(file.name.clone(), description.to_string());
        self.save_manifest(container, &manifest)
    }
}

/// Map a container name to a safe directory name.
fn directory_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "container".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `Some(0)` when `candidate` is `name`, `Some(N)` when it is the `stem_N.ext`
/// variant [`unique_path`] gives `name` on collision.
fn variant_number(name: &str, candidate: &str) -> Option<u32> {
    if candidate == name {
        return Some(0);
    }
    let path = Path::new(name);
    let stem = path.file_stem()?.to_str()?;
    let rest = candidate.strip_prefix(stem)?.strip_prefix('_')?;
    let digits = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => rest.strip_suffix(ext)?.strip_suffix('.')?,
        None => rest,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&n| n > 0)
}

/// Return `path` itself or the first `stem_N.ext` variant that does not exist.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut i = 1u32;
    loop {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_container_created_once() {
        let (_dir, mut store) = store();
        let a = store.get_or_create_container("x@y.edu Email Archive").unwrap();
        let b = store.get_or_create_container("x@y.edu Email Archive").unwrap();
        assert_eq!(a, b);
        assert!(store.container_dir(&a).is_dir());
        assert_eq!(store.open_container(&a.id).unwrap().id, a.id);
    }

    #[test]
    fn test_open_missing_container() {
        let (_dir, mut store) = store();
        assert!(matches!(
            store.open_container("nope"),
            Err(SnapError::ContainerNotFound(_))
        ));
        assert!(matches!(
            store.open_container(".."),
            Err(SnapError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn test_collision_renames() {
        let (_dir, mut store) = store();
        let c = store.get_or_create_container("box").unwrap();
        let first = store.create_file(&c, "a.pdf", "application/pdf", b"1").unwrap();
        let second = store.create_file(&c, "a.pdf", "application/pdf", b"2").unwrap();
        assert_eq!(first.name, "a.pdf");
        assert_eq!(second.name, "a_1.pdf");
    }

    #[test]
    fn test_find_files_includes_renamed_copies() {
        let (_dir, mut store) = store();
        let c = store.get_or_create_container("box").unwrap();
        for _ in 0..3 {
            store.create_file(&c, "a.pdf", "application/pdf", b"x").unwrap();
        }
        store.create_file(&c, "a_b.pdf", "application/pdf", b"x").unwrap();
        let second = store.find_files(&c, "a.pdf").unwrap()[1].clone();
        store.set_description(&c, &second, "Message-ID: <m2@x>").unwrap();

        let found = store.find_files(&c, "a.pdf").unwrap();
        let names: Vec<&str> = found.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.pdf", "a_1.pdf", "a_2.pdf"]);
        assert_eq!(found[1].description.as_deref(), Some("Message-ID: <m2@x>"));
        assert!(store.find_files(&c, "b.pdf").unwrap().is_empty());
    }

    #[test]
    fn test_variant_number() {
        assert_eq!(variant_number("a.pdf", "a.pdf"), Some(0));
        assert_eq!(variant_number("a.pdf", "a_12.pdf"), Some(12));
        assert_eq!(variant_number("notes", "notes_3"), Some(3));
        assert_eq!(variant_number("a.tar.gz", "a.tar_1.gz"), Some(1));
        assert_eq!(variant_number("a.pdf", "a_.pdf"), None);
        assert_eq!(variant_number("a.pdf", "a_x.pdf"), None);
        assert_eq!(variant_number("a.pdf", "a_1.txt"), None);
        assert_eq!(variant_number("a.pdf", "ab_1.pdf"), None);
    }

    #[test]
    fn test_description_roundtrip() {
        let (_dir, mut store) = store();
        let c = store.get_or_create_container("box").unwrap();
        let file = store.create_file(&c, "note one.txt", "text/plain", b"hi").unwrap();
        assert_eq!(file.locator, "note%20one.txt");
        store.set_description(&c, &file, "Message-ID: <m1@x>").unwrap();

        let found = store.find_files(&c, "note one.txt").unwrap();
        assert_eq!(found[0].description.as_deref(), Some("Message-ID: <m1@x>"));
        assert!(store.find_files(&c, MANIFEST_NAME).unwrap().is_empty());
    }

    #[test]
    fn test_directory_name() {
        assert_eq!(directory_name("a/b\\c"), "a_b_c");
        assert_eq!(directory_name(" .. "), "container");
    }
}
