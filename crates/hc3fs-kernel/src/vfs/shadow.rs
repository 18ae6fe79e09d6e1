//! Local on-disk mirror of the virtual tree.
//!
//! Every resolved directory and file has a real counterpart under a
//! per-session temporary directory. Listings and reads are served from here
//! once the resolvers have materialized the path.

use parking_lot::Mutex;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use super::error::{VfsError, VfsResult};
use super::path::VirtualPath;
use super::types::{DirEntry, FileAttr, FileType};

/// Shadow cache rooted at a session temp directory.
///
/// All operations take virtual paths and are confined to the root.
#[derive(Debug)]
pub struct ShadowCache {
    root: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl ShadowCache {
    /// Create a fresh cache in the system temp directory.
    pub fn new() -> VfsResult<Self> {
        let dir = tempfile::Builder::new().prefix("hc3fs-").tempdir()?;
        let root = dir.path().canonicalize()?;
        Ok(Self {
            root,
            dir: Mutex::new(Some(dir)),
        })
    }

    /// Use an existing directory as the root. It is not removed on teardown.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            dir: Mutex::new(None),
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Real location of a virtual path.
    pub fn real_path(&self, path: &VirtualPath) -> VfsResult<PathBuf> {
        let rel = path.to_relative();
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(VfsError::outside_shadow(path.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        FileAttr {
            size: meta.len(),
            kind: FileType::of(meta.is_dir()),
            readonly: false,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }

    /// Create a directory and its parents. An existing directory is fine.
    pub(crate) async fn create_dir(&self, path: &VirtualPath) -> VfsResult<()> {
        let full = self.real_path(path)?;
        fs::create_dir_all(&full)
            .await
            .map_err(|e| VfsError::io_at(path.to_string(), e))
    }

    pub async fn exists(&self, path: &VirtualPath) -> bool {
        match self.real_path(path) {
            Ok(full) => fs::try_exists(&full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn metadata(&self, path: &VirtualPath) -> VfsResult<FileAttr> {
        let full = self.real_path(path)?;
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| VfsError::io_at(path.to_string(), e))?;
        Ok(Self::metadata_to_attr(&meta))
    }

    /// Entries of a directory, sorted by name.
    pub async fn read_dir(&self, path: &VirtualPath) -> VfsResult<Vec<DirEntry>> {
        let full = self.real_path(path)?;
        let mut dir = fs::read_dir(&full)
            .await
            .map_err(|e| VfsError::io_at(path.to_string(), e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let kind = FileType::of(entry.file_type().await?.is_dir());
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn read(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        let full = self.real_path(path)?;
        if fs::metadata(&full).await.is_ok_and(|m| m.is_dir()) {
            return Err(VfsError::is_a_directory(path.to_string()));
        }
        fs::read(&full)
            .await
            .map_err(|e| VfsError::io_at(path.to_string(), e))
    }

    /// Write a whole file, replacing any previous content.
    pub async fn write(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<()> {
        let full = self.real_path(path)?;
        fs::write(&full, data)
            .await
            .map_err(|e| VfsError::io_at(path.to_string(), e))
    }

    pub async fn remove_file(&self, path: &VirtualPath) -> VfsResult<()> {
        let full = self.real_path(path)?;
        fs::remove_file(&full)
            .await
            .map_err(|e| VfsError::io_at(path.to_string(), e))
    }

    /// Remove a directory tree. A missing directory is fine.
    pub async fn remove_dir_all(&self, path: &VirtualPath) -> VfsResult<()> {
        let full = self.real_path(path)?;
        match fs::remove_dir_all(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VfsError::io_at(path.to_string(), e)),
        }
    }

    pub async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> VfsResult<()> {
        let from_full = self.real_path(from)?;
        let to_full = self.real_path(to)?;
        fs::rename(&from_full, &to_full)
            .await
            .map_err(|e| VfsError::io_at(from.to_string(), e))
    }

    /// Delete the temp directory this cache owns. Idempotent.
    pub fn remove(&self) -> VfsResult<()> {
        if let Some(dir) = self.dir.lock().take() {
            dir.close()?;
        }
        Ok(())
    }
}
