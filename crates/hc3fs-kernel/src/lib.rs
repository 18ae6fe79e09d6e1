//! # hc3fs-kernel
//!
//! A lazily materialized virtual filesystem over a home-automation hub.
//!
//! The hub's QuickApps and scenes appear as a two-level directory tree:
//!
//! ```text
//! /QuickApps/12_Lamp/main.lua
//! /QuickApps/12_Lamp/.rsrc.json
//! /Scenes/7_Evening/conditions.lua
//! ```
//!
//! Nothing is fetched until a path is touched. A chain of resolvers per
//! namespace turns each path prefix into real files in a per-session shadow
//! directory, one global lock orders every resolution, and two pollers keep
//! the tree honest when the hub changes underneath it.

pub mod config;
pub mod hub;
pub mod poller;
pub mod resolve;
pub mod session;
pub mod sync;
pub mod vfs;

#[cfg(any(test, feature = "test-mock"))]
pub mod testing;

pub use config::{ConfigError, Hc3Config, HubConfig, LogConfig, PollConfig};
pub use hub::{HubApi, HubError, HubResult, RemoteEvent};
pub use poller::{ConsoleMessage, LogPoller, PollerError, PollerHandle, StatePoller, CONSOLE_TARGET};
pub use resolve::{ObjectKind, ObjectRecord, PathResolver, ResolveContext, Resolver};
pub use session::Session;
pub use sync::{Gate, Lock};
pub use vfs::{
    ChangeNotifier, Decoration, DirEntry, FileAttr, FileChangeEvent, FileChangeType,
    FileSystemProvider, FileType, Hc3Fs, Namespace, RenameOptions, ShadowCache, VfsError,
    VfsResult, VirtualPath, WriteOptions,
};
