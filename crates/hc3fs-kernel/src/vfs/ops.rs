//! Filesystem verbs exposed to the host.
//!
//! Paths are `/`-rooted virtual paths in string form; implementations parse
//! and normalize them. Content is always whole-file.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::events::FileChangeEvent;
use super::types::{DirEntry, FileAttr, RenameOptions, WriteOptions};
use super::VfsResult;

/// Host-facing filesystem provider.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn stat(&self, path: &str) -> VfsResult<FileAttr>;

    /// Read directory entries, sorted by name.
    async fn read_directory(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Read a whole file. The first read of a script fetches it from the hub.
    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write a whole file, pushing it to the hub before it is committed.
    async fn write_file(&self, path: &str, content: &[u8], opts: WriteOptions) -> VfsResult<()>;

    /// Rename a file within its directory.
    async fn rename(&self, from: &str, to: &str, opts: RenameOptions) -> VfsResult<()>;

    /// Delete a file.
    async fn delete(&self, path: &str) -> VfsResult<()>;

    /// Create a directory. The tree's directories mirror remote objects, so
    /// this always fails for callers.
    async fn create_directory(&self, path: &str) -> VfsResult<()>;

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Batched change notifications.
    fn subscribe(&self) -> broadcast::Receiver<Vec<FileChangeEvent>>;
}
