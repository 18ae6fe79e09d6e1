//! Value types passed across the provider surface.
//!
//! Attributes come from the shadow cache; decorations come from the
//! resolvers' cached remote records.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    pub(crate) fn of(is_dir: bool) -> Self {
        if is_dir {
            FileType::Directory
        } else {
            FileType::File
        }
    }
}

/// What `stat` reports for a path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes. Unfetched files report the size of their placeholder.
    pub size: u64,
    pub kind: FileType,
    /// True when writes through the provider are refused.
    pub readonly: bool,
    pub mtime: SystemTime,
}

impl FileAttr {
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }
}

/// One listing entry; `name` is the display name, never a full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileType,
}

impl DirEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::Directory,
        }
    }
}

/// Flags for `write_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Create the file if it does not exist.
    pub create: bool,
    /// Replace the file if it exists.
    pub overwrite: bool,
}

impl WriteOptions {
    /// Create-or-replace, what a plain "save" does.
    pub fn upsert() -> Self {
        Self {
            create: true,
            overwrite: true,
        }
    }

    /// Only create; fail if the file exists.
    pub fn create_new() -> Self {
        Self {
            create: true,
            overwrite: false,
        }
    }

    /// Only replace; fail if the file is missing.
    pub fn update() -> Self {
        Self {
            create: false,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameOptions {
    /// Replace an existing target.
    pub overwrite: bool,
}

/// Presentational metadata for a resolved path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    /// Short marker shown next to the entry.
    pub badge: Option<String>,
    /// Hover text.
    pub tooltip: Option<String>,
    /// Whether the decoration should apply to children too.
    pub propagate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readonly_attr() {
        let attr = FileAttr {
            size: 12,
            kind: FileType::of(false),
            readonly: false,
            mtime: SystemTime::UNIX_EPOCH,
        }
        .with_readonly(true);
        assert!(attr.is_file());
        assert!(!attr.is_dir());
        assert!(attr.readonly);
    }

    #[test]
    fn test_write_options() {
        assert_eq!(
            WriteOptions::upsert(),
            WriteOptions {
                create: true,
                overwrite: true
            }
        );
        assert!(!WriteOptions::create_new().overwrite);
        assert!(!WriteOptions::update().create);
        assert_eq!(WriteOptions::default(), WriteOptions { create: false, overwrite: false });
    }
}
