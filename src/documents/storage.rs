// Uploaded files live below the configured upload root, addressed by relative paths
use std::path::{Component, Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path for a stored relative path. Anything escaping the root is rejected.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, AppError> {
        let rel = Path::new(relative);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean || relative.is_empty() {
            return Err(AppError::Internal(format!("invalid stored path '{}'", relative)));
        }
        Ok(self.root.join(rel))
    }

    /// Write bytes, never overwriting an existing file: a numeric suffix is
    /// added on collision. Returns the relative path actually used.
    pub async fn save(&self, relative: &str, bytes: &[u8]) -> Result<String, AppError> {
        let mut candidate = relative.to_string();
        let mut n = 1;
        loop {
            let path = self.resolve(&candidate)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    use tokio::io::AsyncWriteExt;
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    tracing::info!(path = %candidate, size = bytes.len(), "stored upload");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = with_suffix(relative, n);
                    n += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %relative, "stored file missing");
                Err(AppError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best effort: a missing file is not an error.
    pub async fn remove(&self, relative: &str) {
        let Ok(path) = self.resolve(relative) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %relative, "could not remove stored file: {}", e);
            }
        }
    }
}

fn with_suffix(relative: &str, n: u32) -> String {
    let path = Path::new(relative);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let name = format!("{}_{}{}", stem, n, ext);
    match path.parent().and_then(|p| p.to_str()) {
        Some(parent) if !parent.is_empty() => format!("{}/{}", parent, name),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        let store = FileStore::new("/srv/uploads");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("").is_err());
        assert_eq!(
            store.resolve("documents/an1/a.pdf").unwrap(),
            PathBuf::from("/srv/uploads/documents/an1/a.pdf")
        );
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(with_suffix("documents/a/x.pdf", 1), "documents/a/x_1.pdf");
        assert_eq!(with_suffix("x", 2), "x_2");
    }

    #[tokio::test]
    async fn save_read_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());

        let first = store.save("documents/an1/t.pdf", b"one").await.unwrap();
        let second = store.save("documents/an1/t.pdf", b"two").await.unwrap();
        assert_eq!(first, "documents/an1/t.pdf");
        assert_eq!(second, "documents/an1/t_1.pdf");
        assert_eq!(store.read(&first).await.unwrap(), b"one");
        assert_eq!(store.read(&second).await.unwrap(), b"two");

        store.remove(&first).await;
        assert!(matches!(store.read(&first).await, Err(AppError::NotFound)));
        store.remove(&first).await;
    }
}
