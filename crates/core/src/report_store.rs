// crates/core/src/report_store.rs
//! Access to the flat output directory the inventory tool writes into.
//!
//! Jobs write into a private staging directory under `.staging/` and
//! [`ReportStore::publish`] moves finished files into the shared directory
//! one atomic rename at a time. Two jobs producing the same file name race
//! at publish time; the later rename wins and neither file is ever
//! partially visible.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Hidden directory holding per-job staging areas.
pub const STAGING_DIR: &str = ".staging";

/// A file in the output directory at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List the regular files in the output directory, sorted by name.
    ///
    /// A missing directory is reported as empty.
    pub async fn list(&self) -> Result<Vec<FileInfo>, StoreError> {
        list_files(&self.root).await
    }

    /// Resolve `name` to a path inside the output directory.
    ///
    /// Names that could escape the directory are rejected as `NotFound`
    /// without touching the filesystem.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_file_name(name) {
            tracing::warn!(name = %name, "rejected unsafe report file name");
            return Err(StoreError::not_found(name));
        }
        Ok(self.root.join(name))
    }

    /// Open a report for reading, returning the file and its length.
    pub async fn open(&self, name: &str) -> Result<(tokio::fs::File, u64), StoreError> {
        let path = self.resolve(name)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| StoreError::io(name, &path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(name, &path, e))?;
        if !metadata.is_file() {
            return Err(StoreError::not_found(name));
        }
        Ok((file, metadata.len()))
    }

    /// Create the output directory if it does not exist.
    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })
    }

    /// Create a fresh, empty staging directory for `job_id`.
    pub async fn create_staging(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(STAGING_DIR).join(job_id);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            self.discard_staging(&dir).await;
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Move every regular file in `staging` into the output directory.
    ///
    /// Returns the published names in sorted order. Existing files with the
    /// same name are replaced atomically. Destinations are checked before the
    /// first rename so a blocked name publishes nothing.
    pub async fn publish(&self, staging: &Path) -> Result<Vec<String>, StoreError> {
        let staged = list_files(staging).await?;
        for file in &staged {
            let to = self.root.join(&file.name);
            if let Ok(metadata) = tokio::fs::symlink_metadata(&to).await {
                if metadata.is_dir() {
                    return Err(StoreError::Io {
                        path: to,
                        source: std::io::Error::other("destination is a directory"),
                    });
                }
            }
        }
        let mut published = Vec::with_capacity(staged.len());
        for file in staged {
            let from = staging.join(&file.name);
            let to = self.root.join(&file.name);
            tokio::fs::rename(&from, &to)
                .await
                .map_err(|source| StoreError::Io { path: to.clone(), source })?;
            tracing::debug!(file = %file.name, "published report file");
            published.push(file.name);
        }
        Ok(published)
    }

    /// Remove a staging directory and everything in it. Failures are logged.
    pub async fn discard_staging(&self, staging: &Path) {
        match tokio::fs::remove_dir_all(staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

async fn list_files(dir: &Path) -> Result<Vec<FileInfo>, StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            // Removed between readdir and stat.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(StoreError::Io {
                    path: entry.path(),
                    source,
                })
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        files.push(FileInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// True if `name` is a single normal path component.
fn is_safe_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_safe_file_names() {
        assert!(is_safe_file_name("report.xlsx"));
        assert!(is_safe_file_name("AzureResourceInventory_Report_2024.xml"));
        assert!(is_safe_file_name("..hidden"));
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "/etc/passwd", "..\\secret", "a\0b"] {
            assert!(!is_safe_file_name(bad), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path().join("does-not-exist"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.xml"), b"<x/>").unwrap();
        std::fs::write(tmp.path().join("a.xlsx"), b"12345").unwrap();
        std::fs::create_dir_all(tmp.path().join(STAGING_DIR).join("job")).unwrap();

        let files = ReportStore::new(tmp.path()).list().await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.xlsx", "b.xml"]);
        assert_eq!(files[0].size, 5);
    }

    #[tokio::test]
    async fn test_open_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("r.xlsx"), b"data").unwrap();
        let store = ReportStore::new(tmp.path());

        let (mut file, len) = store.open("r.xlsx").await.unwrap();
        assert_eq!(len, 4);
        let mut buf = String::new();
        file.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "data");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        assert!(matches!(
            store.open("nope.xlsx").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("reports");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(tmp.path().join("secret.txt"), b"top secret").unwrap();
        let store = ReportStore::new(&root);

        for name in ["../secret.txt", "..%2Fsecret.txt/..", "/etc/passwd", ".."] {
            assert!(
                matches!(store.open(name).await, Err(StoreError::NotFound { .. })),
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn test_open_directory_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(STAGING_DIR)).unwrap();
        let store = ReportStore::new(tmp.path());
        assert!(matches!(
            store.open(STAGING_DIR).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_moves_staged_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        let staging = store.create_staging("job-1").await.unwrap();
        std::fs::write(staging.join("r.xlsx"), b"v1").unwrap();

        let published = store.publish(&staging).await.unwrap();
        store.discard_staging(&staging).await;

        assert_eq!(published, vec!["r.xlsx"]);
        assert_eq!(std::fs::read(tmp.path().join("r.xlsx")).unwrap(), b"v1");
        assert!(!staging.exists());
        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["r.xlsx"]);
    }

    #[tokio::test]
    async fn test_same_name_publishes_last_writer_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        let first = store.create_staging("job-a").await.unwrap();
        let second = store.create_staging("job-b").await.unwrap();
        let a = vec![b'a'; 64 * 1024];
        let b = vec![b'b'; 16 * 1024];
        std::fs::write(first.join("Inventory.xlsx"), &a).unwrap();
        std::fs::write(second.join("Inventory.xlsx"), &b).unwrap();

        let (ra, rb) = tokio::join!(store.publish(&first), store.publish(&second));
        ra.unwrap();
        rb.unwrap();

        let content = std::fs::read(tmp.path().join("Inventory.xlsx")).unwrap();
        assert!(content == a || content == b, "file must be one complete version");
    }

    #[tokio::test]
    async fn test_ensure_root_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path().join("nested").join("reports"));
        store.ensure_root().await.unwrap();
        store.ensure_root().await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_publish_blocked_by_directory_moves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        std::fs::create_dir(tmp.path().join("clash.xlsx")).unwrap();
        let staging = store.create_staging("job-1").await.unwrap();
        std::fs::write(staging.join("a.xml"), b"<a/>").unwrap();
        std::fs::write(staging.join("clash.xlsx"), b"v1").unwrap();

        let err = store.publish(&staging).await.unwrap_err();
        match err {
            StoreError::Io { path, .. } => assert_eq!(path, tmp.path().join("clash.xlsx")),
            other => panic!("expected io error, got {other:?}"),
        }
        assert!(!tmp.path().join("a.xml").exists());
        assert!(staging.join("a.xml").exists());
    }

    #[tokio::test]
    async fn test_create_staging_clears_leftovers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        let staging = store.create_staging("job-1").await.unwrap();
        std::fs::write(staging.join("stale.xlsx"), b"old").unwrap();

        let staging = store.create_staging("job-1").await.unwrap();
        assert!(std::fs::read_dir(&staging).unwrap().next().is_none());
    }
}
