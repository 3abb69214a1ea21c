//! Byte storage addressed by opaque location strings.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const FILE_SCHEME: &str = "file://";
const MEM_SCHEME: &str = "mem://";

/// Opaque identifier of stored bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("nothing stored at {0}")]
    NotFound(String),

    #[error("invalid location or namespace: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage collaborator. Called from inside blocking worker threads.
pub trait Storage: Send + Sync {
    fn resolve(&self, location: &Location) -> Result<Vec<u8>, StorageError>;

    fn persist(&self, bytes: &[u8], namespace: &str) -> Result<Location, StorageError>;
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Namespaces are relative, `/`-separated, without `..`.
fn namespace_path(namespace: &str) -> Result<PathBuf, StorageError> {
    let path = Path::new(namespace);
    if namespace.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(StorageError::Invalid(namespace.to_string()));
    }
    Ok(path.to_path_buf())
}

/// Files under a root directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, location: &Location) -> PathBuf {
        let raw = location.as_str();
        let path = Path::new(raw.strip_prefix(FILE_SCHEME).unwrap_or(raw));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Storage for FsStorage {
    fn resolve(&self, location: &Location) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(location);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(location.to_string()),
            _ => StorageError::Io(e),
        })
    }

    fn persist(&self, bytes: &[u8], namespace: &str) -> Result<Location, StorageError> {
        let dir = self.root.join(namespace_path(namespace)?);
        fs::create_dir_all(&dir)?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let name = format!("{millis}-{}.pdf", next_sequence());
        let target = dir.join(&name);
        let temp = dir.join(format!(".{name}.tmp"));

        // write then rename so readers never see a partial file
        fs::write(&temp, bytes)?;
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(Location::new(format!("{FILE_SCHEME}{}", target.display())))
    }
}

/// In-process storage, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes under an exact location, e.g. an uploaded original.
    pub fn insert(&self, location: impl Into<String>, bytes: Vec<u8>) -> Location {
        let location = location.into();
        self.lock().insert(location.clone(), bytes);
        Location::new(location)
    }

    pub fn get(&self, location: &Location) -> Option<Vec<u8>> {
        self.lock().get(location.as_str()).cloned()
    }

    /// Stored locations under `namespace`, sorted.
    pub fn list(&self, namespace: &str) -> Vec<Location> {
        let prefix = format!("{MEM_SCHEME}{namespace}/");
        let mut found: Vec<Location> = self
            .lock()
            .keys()
            .filter(|k| {
                k.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .map(|k| Location::new(k.as_str()))
            .collect();
        found.sort();
        found
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // a poisoned map is still a consistent map
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn resolve(&self, location: &Location) -> Result<Vec<u8>, StorageError> {
        self.get(location)
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }

    fn persist(&self, bytes: &[u8], namespace: &str) -> Result<Location, StorageError> {
        namespace_path(namespace)?;
        let location = format!("{MEM_SCHEME}{namespace}/{}.pdf", next_sequence());
        Ok(self.insert(location, bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_storage_persists_and_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let location = storage.persist(b"%PDF-1.5", "forms/abc").unwrap();
        assert!(location.as_str().starts_with("file://"));
        assert!(location.as_str().ends_with(".pdf"));
        assert_eq!(storage.resolve(&location).unwrap(), b"%PDF-1.5");

        // no temp files left behind
        let leftovers = fs::read_dir(storage.root().join("forms/abc"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn fs_storage_resolves_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("orig.pdf"), b"bytes").unwrap();
        let storage = FsStorage::new(dir.path());
        assert_eq!(storage.resolve(&Location::from("orig.pdf")).unwrap(), b"bytes");
        assert!(matches!(
            storage.resolve(&Location::from("missing.pdf")),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_escaping_namespaces() {
        let storage = MemoryStorage::new();
        for ns in ["", "../up", "/abs", "forms/../x"] {
            assert!(
                matches!(storage.persist(b"x", ns), Err(StorageError::Invalid(_))),
                "{ns}"
            );
        }
    }

    #[test]
    fn memory_storage_lists_namespace() {
        let storage = MemoryStorage::new();
        let a = storage.persist(b"a", "forms/1").unwrap();
        storage.persist(b"b", "forms/1/preview").unwrap();
        assert_eq!(storage.list("forms/1"), vec![a.clone()]);
        assert_eq!(storage.resolve(&a).unwrap(), b"a");
    }
}
