//! The remote hub, as seen by the filesystem.
//!
//! [`HubApi`] is the seam between the resolver core and whatever transport
//! talks to the controller. The HTTP implementation lives in `hc3fs-client`;
//! tests use [`MockHub`](crate::testing::MockHub).

mod error;
mod models;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{HubError, HubResult};
pub use models::{
    DebugMessage, DebugMessages, QuickApp, QuickAppFile, RawEvent, RemoteEvent, Scene, SceneKind,
    ServerInfo, StateEvents,
};

/// Typed operations against the hub's control API.
#[async_trait]
pub trait HubApi: Send + Sync {
    // ========================================================================
    // QuickApps
    // ========================================================================

    async fn list_quick_apps(&self) -> HubResult<Vec<QuickApp>>;

    async fn get_quick_app(&self, id: u64) -> HubResult<QuickApp>;

    /// File listing: names and `isMain`, no content.
    async fn list_quick_app_files(&self, id: u64) -> HubResult<Vec<QuickAppFile>>;

    async fn get_quick_app_file_content(&self, id: u64, name: &str) -> HubResult<Vec<u8>>;

    async fn create_quick_app_file(&self, id: u64, file: &QuickAppFile) -> HubResult<()>;

    async fn update_quick_app_file(&self, id: u64, file: &QuickAppFile) -> HubResult<()>;

    async fn delete_quick_app_file(&self, id: u64, name: &str) -> HubResult<()>;

    async fn rename_quick_app_file(&self, id: u64, name: &str, new_name: &str) -> HubResult<()>;

    /// Full `.fqa` export document.
    async fn export_quick_app(&self, id: u64) -> HubResult<Value>;

    // ========================================================================
    // Scenes
    // ========================================================================

    async fn list_scenes(&self) -> HubResult<Vec<Scene>>;

    async fn get_scene(&self, id: u64) -> HubResult<Scene>;

    /// Partial update; `patch` is merged into the scene record by the hub.
    async fn update_scene(&self, id: u64, patch: &Value) -> HubResult<()>;

    // ========================================================================
    // System
    // ========================================================================

    async fn get_server_info(&self) -> HubResult<ServerInfo>;

    /// Debug console messages newer than `since` (seconds).
    async fn get_debug_messages(&self, since: i64) -> HubResult<DebugMessages>;

    /// State events after `last`.
    async fn get_state_events(&self, last: i64) -> HubResult<StateEvents>;
}
