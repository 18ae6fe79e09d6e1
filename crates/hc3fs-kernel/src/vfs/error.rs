//! Errors surfaced by filesystem operations.
//!
//! Local shadow I/O, hub failures and rule violations all end up here so
//! the host sees one error type per call.

use std::io;
use thiserror::Error;

use crate::hub::HubError;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Read-only target, protected file, cross-object move or bad name.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A shadow path resolved outside the shadow root.
    #[error("outside shadow root: {0}")]
    OutsideShadow(String),

    /// Path that cannot name anything in the tree (`..`, wrong depth).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The hub call behind this operation failed.
    #[error("remote: {0}")]
    Remote(#[from] HubError),

    /// A hub record or payload that could not be (de)serialised.
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("shadow I/O: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn outside_shadow(path: impl Into<String>) -> Self {
        Self::OutsideShadow(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Attach a path to an I/O error, turning a missing file into NotFound.
    pub(crate) fn io_at(path: impl Into<String>, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.into()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.into()),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path.into()),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path.into()),
            _ => Self::Io(e),
        }
    }

    /// True for a local miss and for a hub 404 alike.
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Remote(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// For hosts that speak `std::io`.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        use io::ErrorKind as K;
        if let VfsError::Io(inner) = e {
            return inner;
        }
        let kind = match &e {
            VfsError::NotFound(_) => K::NotFound,
            VfsError::Remote(remote) if remote.is_not_found() => K::NotFound,
            VfsError::AlreadyExists(_) => K::AlreadyExists,
            VfsError::PermissionDenied(_) | VfsError::OutsideShadow(_) => K::PermissionDenied,
            VfsError::NotADirectory(_) => K::NotADirectory,
            VfsError::IsADirectory(_) => K::IsADirectory,
            VfsError::InvalidPath(_) => K::InvalidInput,
            VfsError::Malformed(_) => K::InvalidData,
            VfsError::Remote(_) | VfsError::Io(_) => K::Other,
        };
        io::Error::new(kind, e)
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_mapping() {
        let e = VfsError::io_at("/QuickApps/x", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(e, VfsError::NotFound(ref p) if p == "/QuickApps/x"));

        let e = VfsError::io_at("/QuickApps/x", io::Error::from(io::ErrorKind::Interrupted));
        assert!(matches!(e, VfsError::Io(_)));
    }

    #[test]
    fn test_remote_not_found() {
        let e: VfsError = HubError::status(404, "Not Found").into();
        assert!(e.is_not_found());
        assert_eq!(e.to_string(), "remote: 404 - Not Found");

        let e: VfsError = HubError::status(500, "Internal Server Error").into();
        assert!(!e.is_not_found());
    }

    #[test]
    fn test_into_io_error() {
        let io: io::Error = VfsError::permission_denied("main.lua").into();
        assert_eq!(io.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(io.to_string(), "permission denied: main.lua");

        let io: io::Error = VfsError::Remote(HubError::status(404, "Not Found")).into();
        assert_eq!(io.kind(), io::ErrorKind::NotFound);

        let io: io::Error = VfsError::Io(io::Error::from(io::ErrorKind::TimedOut)).into();
        assert_eq!(io.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_json_error_is_malformed() {
        let e: VfsError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(e, VfsError::Malformed(_)));
    }
}
