use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};

use super::StorageError;

// Local filesystem storage rooted at the uploads directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates the uploads root and the project image directory if missing.
    pub async fn new(root: impl Into<PathBuf>, project_images: &Path) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(project_images).await?;
        Ok(Self { root })
    }

    fn root(&self) -> &Path {
        &self.root
    }

    /// `path` as shown to clients: relative to the uploads root, never the
    /// absolute server path.
    fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(self.root()) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Writes content to `path`, creating parent directories as needed.
    pub async fn write(&self, path: &Path, content: &Bytes) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(path).await?;
        file.write_all(content).await?;
        file.flush().await?;

        info!("Saved file at {:?} ({} bytes)", path, content.len());
        Ok(())
    }

    pub async fn read(&self, path: &Path) -> Result<Bytes, StorageError> {
        match fs::read(path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(self.relative(path)))
            }
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Size of a file on disk, 0 when it is missing or unreadable.
    pub async fn size_of(&self, path: &Path) -> u64 {
        fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    }

    /// Removes a file. A file that is already gone is not an error; returns
    /// whether something was removed.
    pub async fn remove_file(&self, path: &Path) -> Result<bool, StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    /// Removes a directory only when it has no entries left.
    pub async fn remove_dir_if_empty(&self, dir: &Path) -> Result<bool, StorageError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StorageError::IoError(e)),
        };
        if entries.next_entry().await?.is_some() {
            return Ok(false);
        }
        fs::remove_dir(dir).await?;
        Ok(true)
    }

    /// Removes a directory and everything below it. Missing is not an error.
    pub async fn remove_tree(&self, dir: &Path) -> Result<bool, StorageError> {
        match fs::remove_dir_all(dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    /// Moves a directory tree. Uses a plain rename; when that fails because
    /// source and destination are on different devices the tree is copied
    /// and the source removed.
    pub async fn move_dir(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if !self.exists(from).await {
            return Err(StorageError::NotFound(self.relative(from)));
        }
        if self.exists(to).await {
            return Err(StorageError::AlreadyExists(self.relative(to)));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                warn!("Rename {:?} -> {:?} crosses devices, copying instead", from, to);
                let (src, dst) = (from.to_path_buf(), to.to_path_buf());
                tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
                    .await
                    .map_err(|e| StorageError::Task(e.to_string()))??;
                fs::remove_dir_all(from).await?;
                Ok(())
            }
            Err(e) => Err(StorageError::IoError(e)),
        }
    }
}

/// Copies a directory tree with an explicit stack instead of recursion.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<(), StorageError> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        std::fs::create_dir_all(&dst)?;
        for entry in std::fs::read_dir(&src)? {
            let entry = entry?;
            let target = dst.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                std::fs::copy(entry.path(), &target)?;
            }
        }
    }
    Ok(())
}
