//! The virtual filesystem over the hub.
//!
//! Key components:
//!
//! - [`FileSystemProvider`] - Host-facing verbs (stat, read, write, ...)
//! - [`Hc3Fs`] - The provider, backed by the resolver engine
//! - [`ShadowCache`] - Local on-disk mirror of everything resolved so far
//! - [`ChangeNotifier`] - Debounced change batches for the host
//!
//! ## Design Decisions
//!
//! - **Path-based**: every verb takes a `/`-rooted virtual path; there are
//!   no handles or inodes.
//! - **Whole-file content**: scripts are small, and the hub only accepts
//!   whole files.
//! - **Lazy materialization**: nothing is fetched until a path is touched,
//!   and file content is not fetched until it is read.

mod error;
mod events;
mod ops;
mod path;
mod provider;
mod shadow;
mod types;

pub use error::{VfsError, VfsResult};
pub use events::{ChangeNotifier, FileChangeEvent, FileChangeType, DEBOUNCE};
pub use ops::FileSystemProvider;
pub use path::{
    check_script_name, is_generated, is_segment, object_dir_name, parse_object_id, parse_sentinel,
    remote_file_name, script_file_name, sentinel, Namespace, VirtualPath, ACTIONS_FILE,
    BLOCK_FILE, CONDITIONS_FILE, FILE_MARK, RSRC_FILE, RUN_FILE, SCRIPT_EXT,
};
pub use provider::Hc3Fs;
pub use shadow::ShadowCache;
pub use types::{Decoration, DirEntry, FileAttr, FileType, RenameOptions, WriteOptions};
