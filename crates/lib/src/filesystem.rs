//! File-system access used by the file tools.
//!
//! Relative paths are resolved against a root directory (the agent workspace); absolute paths
//! are used as given.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    /// Size in bytes; 0 for directories.
    pub size: u64,
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<String, FsError>;
    /// Write (create or truncate), creating missing parent directories.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError>;
    /// Create an empty file if it does not exist; an existing file is left untouched.
    async fn create_file(&self, path: &str) -> Result<(), FsError>;
    /// Delete a file or an empty directory. A missing path is not an error.
    async fn delete_file(&self, path: &str) -> Result<(), FsError>;
    async fn exists(&self, path: &str) -> bool;
    /// Directory entries, directories first, then by name.
    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, FsError>;
}

/// [`FileSystem`] over the local disk via `tokio::fs`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path.trim());
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> FsError {
    if source.kind() == std::io::ErrorKind::NotFound {
        FsError::NotFound(path.to_path_buf())
    } else {
        FsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<(), FsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    Ok(())
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let p = self.resolve(path);
        tokio::fs::read_to_string(&p).await.map_err(|e| io_err(&p, e))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let p = self.resolve(path);
        ensure_parent(&p).await?;
        tokio::fs::write(&p, content).await.map_err(|e| io_err(&p, e))
    }

    async fn create_file(&self, path: &str) -> Result<(), FsError> {
        let p = self.resolve(path);
        ensure_parent(&p).await?;
        tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&p)
            .await
            .map(|_| ())
            .map_err(|e| io_err(&p, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let p = self.resolve(path);
        let meta = match tokio::fs::metadata(&p).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err(&p, e)),
        };
        let res = if meta.is_dir() {
            tokio::fs::remove_dir(&p).await
        } else {
            tokio::fs::remove_file(&p).await
        };
        res.map_err(|e| io_err(&p, e))
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.resolve(path))
            .await
            .unwrap_or(false)
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, FsError> {
        let dir = self.resolve(path);
        let meta = tokio::fs::metadata(&dir).await.map_err(|e| io_err(&dir, e))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory(dir));
        }
        let mut rd = tokio::fs::read_dir(&dir).await.map_err(|e| io_err(&dir, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = rd.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    log::debug!("list_files: skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: if meta.is_file() { meta.len() } else { 0 },
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_parents_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path());
        fs.write_file("a/b/c.txt", "hello").await.unwrap();
        assert_eq!(fs.read_file("a/b/c.txt").await.unwrap(), "hello");
        assert!(fs.exists("a/b").await);
    }

    #[tokio::test]
    async fn create_does_not_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path());
        fs.write_file("keep.txt", "data").await.unwrap();
        fs.create_file("keep.txt").await.unwrap();
        assert_eq!(fs.read_file("keep.txt").await.unwrap(), "data");
        fs.create_file("new/empty.txt").await.unwrap();
        assert_eq!(fs.read_file("new/empty.txt").await.unwrap(), "");
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path());
        fs.delete_file("nope.txt").await.unwrap();
        fs.write_file("x.txt", "1").await.unwrap();
        fs.delete_file("x.txt").await.unwrap();
        assert!(!fs.exists("x.txt").await);
    }

    #[tokio::test]
    async fn list_sorts_dirs_first() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path());
        fs.write_file("b.txt", "12").await.unwrap();
        fs.write_file("a.txt", "1").await.unwrap();
        fs.write_file("zdir/inner.txt", "").await.unwrap();
        let names: Vec<(String, bool, u64)> = fs
            .list_files(".")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir, e.size))
            .collect();
        assert_eq!(
            names,
            vec![
                ("zdir".to_string(), true, 0),
                ("a.txt".to_string(), false, 1),
                ("b.txt".to_string(), false, 2),
            ]
        );
    }

    #[tokio::test]
    async fn list_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path());
        assert!(matches!(fs.list_files("missing").await, Err(FsError::NotFound(_))));
        fs.write_file("f.txt", "").await.unwrap();
        assert!(matches!(fs.list_files("f.txt").await, Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.read_file("missing.txt").await, Err(FsError::NotFound(_))));
    }
}
