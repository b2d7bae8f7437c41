//! File persistence under a single root directory.
//!
//! Every client-supplied name is reduced to its final path component
//! before it touches the filesystem, so no request can reach outside the
//! root. The store does whole-file reads for downloads and positioned
//! segment writes for uploads; `pool` bounds how many of those writes
//! run at once.

pub mod pool;

use crate::error::{DepotError, Result};
use crate::protocol::{MAX_LIST_ENTRIES, MAX_LIST_NAME_LEN};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reduce a client-supplied name to `root/<final component>`.
    ///
    /// Directory components are dropped, not resolved: `a/b/c.txt` and
    /// `../../etc/passwd` land in the root as `c.txt` and `passwd`.
    /// Names with no final component (`""`, `"."`, `".."`, `"/"`) are
    /// rejected.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let name = Path::new(raw)
            .file_name()
            .ok_or_else(|| DepotError::BadFilename(raw.to_string()))?;
        Ok(self.root.join(name))
    }

    /// Whole-file read for a download reply.
    pub async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(path)
            .await
            .map_err(|e| DepotError::fs("open", path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| DepotError::fs("stat", path, e))?
            .len();

        let mut contents = Vec::with_capacity(size as usize);
        file.read_to_end(&mut contents)
            .await
            .map_err(|e| DepotError::fs("read", path, e))?;
        Ok(contents)
    }

    /// Names in the root, capped to what one list reply can carry.
    /// `.` and `..` never appear; over-long names are dropped with a
    /// warning rather than failing the listing.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| DepotError::fs("list", &self.root, e))?;

        let mut names = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(DepotError::fs("list", &self.root, e)),
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.len() > MAX_LIST_NAME_LEN {
                tracing::warn!(name = %name, "name too long for a list reply, skipped");
                continue;
            }
            names.push(name);
            if names.len() == MAX_LIST_ENTRIES {
                tracing::debug!("list reply full at {} entries", MAX_LIST_ENTRIES);
                break;
            }
        }
        Ok(names)
    }
}

/// Write one segment at its offset and flush it.
///
/// Offset zero marks the start of a fresh upload and truncates whatever
/// was there; later chunks of the same file must not clobber the earlier
/// ones, so nonzero offsets never truncate. Returns the bytes written.
pub async fn write_segment(path: &Path, offset: u64, data: &[u8]) -> Result<u64> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(offset == 0)
        .open(path)
        .await
        .map_err(|e| DepotError::fs("open", path, e))?;

    if offset != 0 {
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| DepotError::fs("seek", path, e))?;
    }
    file.write_all(data)
        .await
        .map_err(|e| DepotError::fs("write", path, e))?;
    file.flush()
        .await
        .map_err(|e| DepotError::fs("write", path, e))?;

    Ok(data.len() as u64)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_plain_name() {
        let store = FileStore::new("/srv/depot");
        assert_eq!(
            store.resolve("a.txt").unwrap(),
            PathBuf::from("/srv/depot/a.txt")
        );
    }

    #[test]
    fn test_resolve_strips_directories() {
        let store = FileStore::new("/srv/depot");
        assert_eq!(
            store.resolve("uploads/2024/c.txt").unwrap(),
            PathBuf::from("/srv/depot/c.txt")
        );
        assert_eq!(
            store.resolve("../../etc/passwd").unwrap(),
            PathBuf::from("/srv/depot/passwd")
        );
    }

    #[test]
    fn test_resolve_rejects_empty_basenames() {
        let store = FileStore::new("/srv/depot");
        for raw in ["", ".", "..", "/", "a/.."] {
            assert!(
                matches!(store.resolve(raw), Err(DepotError::BadFilename(_))),
                "{raw:?} should have no usable filename"
            );
        }
    }

    #[tokio::test]
    async fn test_write_segment_creates_exact_length() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");

        let written = write_segment(&path, 0, b"hello").await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(stdfs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_write_segment_offset_zero_truncates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        stdfs::write(&path, b"old contents that were longer").unwrap();

        write_segment(&path, 0, b"new").await.unwrap();
        assert_eq!(stdfs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_write_segment_nonzero_offset_extends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.bin");

        write_segment(&path, 0, b"hello ").await.unwrap();
        write_segment(&path, 6, b"world").await.unwrap();
        assert_eq!(stdfs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_write_segment_open_failure() {
        let tmp = TempDir::new().unwrap();
        // The root itself is a directory, not a writable file.
        let err = write_segment(tmp.path(), 0, b"x").await.unwrap_err();
        assert!(matches!(err, DepotError::Filesystem { op: "open", .. }));
    }

    #[tokio::test]
    async fn test_read_file_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        let path = store.resolve("data.bin").unwrap();

        write_segment(&path, 0, b"stored bytes").await.unwrap();
        assert_eq!(store.read_file(&path).await.unwrap(), b"stored bytes");
    }

    #[tokio::test]
    async fn test_read_file_missing() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        let path = store.resolve("nope.txt").unwrap();

        assert!(matches!(
            store.read_file(&path).await,
            Err(DepotError::Filesystem { op: "open", .. })
        ));
    }

    #[tokio::test]
    async fn test_list_names_empty_root() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        assert!(store.list_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_names_returns_entries() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        for name in ["a.txt", "b.bin", "c"] {
            stdfs::write(tmp.path().join(name), b"x").unwrap();
        }

        let mut names = store.list_names().await.unwrap();
        names.sort();
        assert_eq!(names, ["a.txt", "b.bin", "c"]);
    }

    #[tokio::test]
    async fn test_list_names_includes_hidden_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        for name in [".hidden", "visible.txt"] {
            stdfs::write(tmp.path().join(name), b"x").unwrap();
        }

        let mut names = store.list_names().await.unwrap();
        names.sort();
        assert_eq!(names, [".hidden", "visible.txt"]);
    }

    #[tokio::test]
    async fn test_list_names_caps_at_reply_bound() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        for i in 0..MAX_LIST_ENTRIES + 5 {
            stdfs::write(tmp.path().join(format!("f{i:03}")), b"").unwrap();
        }

        assert_eq!(store.list_names().await.unwrap().len(), MAX_LIST_ENTRIES);
    }

    #[tokio::test]
    async fn test_list_names_missing_root() {
        let store = FileStore::new("/no/such/depot/root");
        assert!(matches!(
            store.list_names().await,
            Err(DepotError::Filesystem { op: "list", .. })
        ));
    }
}
