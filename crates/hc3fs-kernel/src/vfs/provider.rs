//! The hub filesystem: provider verbs over the resolver engine.
//!
//! Every verb waits for the session gate, resolves its target through the
//! engine, then works on the shadow cache. Writes go to the hub first and
//! only touch the shadow cache once the hub accepted them.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::error::{VfsError, VfsResult};
use super::events::{ChangeNotifier, FileChangeEvent};
use super::ops::FileSystemProvider;
use super::path::{
    check_script_name, is_generated, remote_file_name, Namespace, VirtualPath, ACTIONS_FILE,
    CONDITIONS_FILE,
};
use super::types::{Decoration, DirEntry, FileAttr, RenameOptions, WriteOptions};
use crate::hub::{HubApi, HubError, QuickAppFile, SceneKind};
use crate::resolve::{ObjectKind, ObjectRecord, PathResolver};
use crate::sync::Gate;

/// Filesystem view of one hub.
pub struct Hc3Fs {
    hub: Arc<dyn HubApi>,
    engine: Arc<PathResolver>,
    gate: Arc<Gate>,
    notifier: Arc<ChangeNotifier>,
}

impl Hc3Fs {
    pub fn new(
        hub: Arc<dyn HubApi>,
        engine: Arc<PathResolver>,
        gate: Arc<Gate>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        Self {
            hub,
            engine,
            gate,
            notifier,
        }
    }

    pub fn engine(&self) -> &Arc<PathResolver> {
        &self.engine
    }

    /// Parse, reject reserved paths, and wait for the session to be ready.
    async fn enter(&self, raw: &str) -> VfsResult<VirtualPath> {
        let path = VirtualPath::parse(raw)?;
        if path.is_reserved() {
            return Err(VfsError::not_found(path.to_string()));
        }
        self.gate.wait().await;
        Ok(path)
    }

    /// Scripts are the only files with a depth of three.
    fn require_file(path: &VirtualPath) -> VfsResult<()> {
        if path.depth() != 3 {
            return Err(VfsError::permission_denied(path.to_string()));
        }
        Ok(())
    }

    fn record(&self, path: &VirtualPath) -> VfsResult<ObjectRecord> {
        self.engine
            .object_record(path)
            .ok_or_else(|| VfsError::not_found(path.to_string()))
    }

    /// Whether the provider refuses writes to `path`.
    ///
    /// The root, namespaces and scene directories are fixed; generated files
    /// are derived from the remote record; only the conditions and actions
    /// of `lua` scenes are editable scene files.
    pub fn is_readonly(&self, path: &VirtualPath) -> bool {
        let Some(ns) = path.namespace() else {
            return true;
        };
        match (ns, path.depth()) {
            (_, 0 | 1) => true,
            (Namespace::QuickApps, 2) => false,
            (Namespace::Scenes, 2) => true,
            (_, 3) => {
                let name = path.file_name().unwrap_or_default();
                if is_generated(ns, name) {
                    return true;
                }
                match ns {
                    Namespace::QuickApps => false,
                    Namespace::Scenes => {
                        let editable = name == CONDITIONS_FILE || name == ACTIONS_FILE;
                        let lua = self
                            .engine
                            .object_record(path)
                            .and_then(|r| r.scene_kind())
                            == Some(SceneKind::Lua);
                        !(editable && lua)
                    }
                }
            }
            _ => true,
        }
    }

    /// Cached presentation for a path. Never reaches the hub.
    pub fn decorate(&self, raw: &str) -> Option<Decoration> {
        let path = VirtualPath::parse(raw).ok()?;
        self.engine.decorate(&path)
    }

    /// Download form of the object `raw` lives in: the `.fqa` export of a
    /// QuickApp, or the scene record.
    pub async fn export(&self, raw: &str) -> VfsResult<Value> {
        let path = self.enter(raw).await?;
        let dir = path
            .object_dir()
            .ok_or_else(|| VfsError::invalid_path(path.to_string()))?;
        self.engine.resolve_path(&dir, false).await?;
        let record = self.record(&dir)?;
        match record.kind {
            ObjectKind::QuickApp { .. } => Ok(self.hub.export_quick_app(record.id).await?),
            ObjectKind::Scene { .. } => {
                let scene = self.hub.get_scene(record.id).await?;
                Ok(serde_json::to_value(scene)?)
            }
        }
    }

    async fn write_quick_app_file(
        &self,
        path: &VirtualPath,
        record: &ObjectRecord,
        content: &[u8],
        exists: bool,
    ) -> VfsResult<()> {
        let name = path.file_name().unwrap_or_default();
        let text = String::from_utf8_lossy(content);

        if exists {
            let remote = remote_file_name(name)
                .ok_or_else(|| VfsError::permission_denied(path.to_string()))?;
            let file = QuickAppFile::with_content(remote, record.is_main(remote), text);
            self.hub.update_quick_app_file(record.id, &file).await?;
            self.engine.shadow().write(path, content).await?;
            self.engine.mark_fetched(path);
            tracing::info!(path = %path, bytes = content.len(), "file updated");
            self.notifier.fire(FileChangeEvent::changed(path.clone()));
        } else {
            let remote = check_script_name(name)?;
            let file = QuickAppFile::with_content(remote, false, text);
            self.hub.create_quick_app_file(record.id, &file).await?;
            self.invalidate_parent(path).await?;
            tracing::info!(path = %path, bytes = content.len(), "file created");
            self.notifier.fire(FileChangeEvent::created(path.clone()));
        }
        Ok(())
    }

    async fn write_scene_file(
        &self,
        path: &VirtualPath,
        record: &ObjectRecord,
        content: &[u8],
    ) -> VfsResult<()> {
        let field = match path.file_name() {
            Some(CONDITIONS_FILE) => "conditions",
            Some(ACTIONS_FILE) => "actions",
            _ => return Err(VfsError::permission_denied(path.to_string())),
        };

        let scene = self.hub.get_scene(record.id).await?;
        let mut body = scene
            .content_json()
            .map_err(|e| HubError::Decode(format!("scene {} content: {e}", record.id)))?;
        let Some(fields) = body.as_object_mut() else {
            return Err(VfsError::malformed(format!("scene {} content is not an object", record.id)));
        };
        fields.insert(
            field.to_string(),
            Value::String(String::from_utf8_lossy(content).into_owned()),
        );
        let encoded = serde_json::to_string(&body)?;
        self.hub
            .update_scene(record.id, &serde_json::json!({ "content": encoded }))
            .await?;

        self.invalidate_parent(path).await?;
        tracing::info!(path = %path, field, "scene updated");
        self.notifier.fire(FileChangeEvent::changed(path.clone()));
        Ok(())
    }

    async fn invalidate_parent(&self, path: &VirtualPath) -> VfsResult<()> {
        match path.parent() {
            Some(parent) => self.engine.invalidate(&parent).await,
            None => Ok(()),
        }
    }

    /// Common checks for delete and rename sources: an existing, removable
    /// QuickApp script. Returns the object record and the remote name.
    async fn removable_script(&self, path: &VirtualPath) -> VfsResult<(ObjectRecord, String)> {
        Self::require_file(path)?;
        self.engine.resolve_path(path, false).await?;
        if path.namespace() != Some(Namespace::QuickApps) || self.is_readonly(path) {
            return Err(VfsError::permission_denied(path.to_string()));
        }
        let record = self.record(path)?;
        let remote = path
            .file_name()
            .and_then(remote_file_name)
            .ok_or_else(|| VfsError::permission_denied(path.to_string()))?;
        if record.is_main(remote) {
            return Err(VfsError::permission_denied(format!(
                "{path}: the main file cannot be removed"
            )));
        }
        Ok((record, remote.to_string()))
    }
}

#[async_trait]
impl FileSystemProvider for Hc3Fs {
    async fn stat(&self, raw: &str) -> VfsResult<FileAttr> {
        let path = self.enter(raw).await?;
        self.engine.resolve_path(&path, false).await?;
        let attr = self.engine.shadow().metadata(&path).await?;
        Ok(attr.with_readonly(self.is_readonly(&path)))
    }

    async fn read_directory(&self, raw: &str) -> VfsResult<Vec<DirEntry>> {
        let path = self.enter(raw).await?;
        if path.is_root() {
            return Ok(Namespace::ALL
                .iter()
                .map(|ns| DirEntry::directory(ns.as_str()))
                .collect());
        }
        self.engine.resolve_path(&path, false).await?;
        let shadow = self.engine.shadow();
        if !shadow.metadata(&path).await?.is_dir() {
            return Err(VfsError::not_a_directory(path.to_string()));
        }
        shadow.read_dir(&path).await
    }

    async fn read_file(&self, raw: &str) -> VfsResult<Vec<u8>> {
        let path = self.enter(raw).await?;
        if path.depth() < 3 {
            return Err(VfsError::is_a_directory(path.to_string()));
        }
        self.engine.resolve_path(&path, true).await?;
        let data = self.engine.shadow().read(&path).await?;
        tracing::debug!(path = %path, bytes = data.len(), "read");
        Ok(data)
    }

    async fn write_file(&self, raw: &str, content: &[u8], opts: WriteOptions) -> VfsResult<()> {
        let path = self.enter(raw).await?;
        Self::require_file(&path)?;
        let parent = path
            .parent()
            .ok_or_else(|| VfsError::invalid_path(path.to_string()))?;
        self.engine.resolve_path(&parent, false).await?;
        let exists = match self.engine.resolve_path(&path, false).await {
            Ok(_) => true,
            Err(VfsError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };

        if (exists && self.is_readonly(&path)) || (!exists && self.is_readonly(&parent)) {
            return Err(VfsError::permission_denied(path.to_string()));
        }
        if exists && !opts.overwrite {
            return Err(VfsError::already_exists(path.to_string()));
        }
        if !exists && !opts.create {
            return Err(VfsError::not_found(path.to_string()));
        }

        let record = self.record(&parent)?;
        match record.kind {
            ObjectKind::QuickApp { .. } => {
                self.write_quick_app_file(&path, &record, content, exists).await
            }
            ObjectKind::Scene { .. } if exists => {
                self.write_scene_file(&path, &record, content).await
            }
            ObjectKind::Scene { .. } => Err(VfsError::permission_denied(path.to_string())),
        }
    }

    async fn rename(&self, raw_from: &str, raw_to: &str, opts: RenameOptions) -> VfsResult<()> {
        let from = self.enter(raw_from).await?;
        let to = self.enter(raw_to).await?;
        Self::require_file(&to)?;
        if from.parent() != to.parent() {
            return Err(VfsError::permission_denied(format!(
                "{from} -> {to}: files cannot move between objects"
            )));
        }
        if from == to {
            return Ok(());
        }

        let (record, old_remote) = self.removable_script(&from).await?;
        if self.is_readonly(&to) {
            return Err(VfsError::permission_denied(to.to_string()));
        }
        let new_remote = check_script_name(to.file_name().unwrap_or_default())?;

        let shadow = self.engine.shadow();
        if shadow.exists(&to).await {
            if !opts.overwrite {
                return Err(VfsError::already_exists(to.to_string()));
            }
            if record.is_main(new_remote) {
                return Err(VfsError::permission_denied(to.to_string()));
            }
            self.hub.delete_quick_app_file(record.id, new_remote).await?;
            shadow.remove_file(&to).await?;
        }

        self.hub
            .rename_quick_app_file(record.id, &old_remote, new_remote)
            .await?;
        shadow.rename(&from, &to).await?;
        self.invalidate_parent(&from).await?;

        tracing::info!(from = %from, to = %to, "file renamed");
        self.notifier.fire(FileChangeEvent::deleted(from));
        self.notifier.fire(FileChangeEvent::created(to));
        Ok(())
    }

    async fn delete(&self, raw: &str) -> VfsResult<()> {
        let path = self.enter(raw).await?;
        let (record, remote) = self.removable_script(&path).await?;

        self.hub.delete_quick_app_file(record.id, &remote).await?;
        self.engine.shadow().remove_file(&path).await?;
        self.invalidate_parent(&path).await?;

        tracing::info!(path = %path, "file deleted");
        self.notifier.fire(FileChangeEvent::deleted(path));
        Ok(())
    }

    async fn create_directory(&self, raw: &str) -> VfsResult<()> {
        let path = self.enter(raw).await?;
        Err(VfsError::permission_denied(format!(
            "{path}: directories mirror hub objects and cannot be created"
        )))
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<FileChangeEvent>> {
        self.notifier.subscribe()
    }
}
