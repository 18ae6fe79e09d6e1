//! In-memory hub for tests.
//!
//! [`MockHub`] keeps QuickApps, scenes, queued state events and debug
//! messages in memory, records every call in order, and can delay or fail
//! individual operations.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::hub::{
    DebugMessage, DebugMessages, HubApi, HubError, HubResult, QuickApp, QuickAppFile, RawEvent,
    Scene, ServerInfo, StateEvents,
};

#[derive(Default)]
struct MockState {
    quick_apps: BTreeMap<u64, (QuickApp, Vec<QuickAppFile>)>,
    scenes: BTreeMap<u64, Scene>,
    info: ServerInfo,
    events: Vec<RawEvent>,
    cursor: i64,
    messages: Vec<DebugMessage>,
}

/// Recording mock of the hub API.
#[derive(Default)]
pub struct MockHub {
    state: Mutex<MockState>,
    calls: Mutex<Vec<String>>,
    trace: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, u16>>,
    delay: Mutex<Option<Duration>>,
}

fn reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

fn not_found() -> HubError {
    HubError::status(404, reason(404))
}

impl MockHub {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Remote side
    // ========================================================================

    /// Add a QuickApp. `files` should carry content.
    pub fn add_quick_app(&self, qa: QuickApp, files: Vec<QuickAppFile>) {
        self.state.lock().quick_apps.insert(qa.id, (qa, files));
    }

    pub fn remove_quick_app(&self, id: u64) {
        self.state.lock().quick_apps.remove(&id);
    }

    pub fn add_scene(&self, scene: Scene) {
        self.state.lock().scenes.insert(scene.id, scene);
    }

    pub fn set_server_info(&self, info: ServerInfo) {
        self.state.lock().info = info;
    }

    /// Queue a state event for the next `get_state_events`.
    pub fn push_event(&self, kind: &str, id: u64) {
        self.state.lock().events.push(RawEvent::new(kind, id));
    }

    pub fn push_debug_message(&self, timestamp: i64, tag: &str, level: &str, message: &str) {
        self.state.lock().messages.push(DebugMessage {
            id: None,
            timestamp,
            tag: tag.to_string(),
            level: level.to_string(),
            message: message.to_string(),
        });
    }

    /// Current content of a QuickApp file.
    pub fn file_content(&self, id: u64, name: &str) -> Option<String> {
        let state = self.state.lock();
        let (_, files) = state.quick_apps.get(&id)?;
        files
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.content.clone())
    }

    pub fn file_names(&self, id: u64) -> Vec<String> {
        self.state
            .lock()
            .quick_apps
            .get(&id)
            .map(|(_, files)| files.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn scene(&self, id: u64) -> Option<Scene> {
        self.state.lock().scenes.get(&id).cloned()
    }

    // ========================================================================
    // Call control and inspection
    // ========================================================================

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Make the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: &str, status: u16) {
        self.failures.lock().insert(op.to_string(), status);
    }

    /// Operation names, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// `begin {op}` / `end {op}` markers, in order.
    pub fn trace(&self) -> Vec<String> {
        self.trace.lock().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
        self.trace.lock().clear();
    }

    async fn enter(&self, op: &str) -> HubResult<()> {
        self.calls.lock().push(op.to_string());
        self.trace.lock().push(format!("begin {op}"));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.trace.lock().push(format!("end {op}"));
        match self.failures.lock().remove(op) {
            Some(status) => Err(HubError::status(status, reason(status))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HubApi for MockHub {
    async fn list_quick_apps(&self) -> HubResult<Vec<QuickApp>> {
        self.enter("list_quick_apps").await?;
        Ok(self
            .state
            .lock()
            .quick_apps
            .values()
            .map(|(qa, _)| qa.clone())
            .collect())
    }

    async fn get_quick_app(&self, id: u64) -> HubResult<QuickApp> {
        self.enter("get_quick_app").await?;
        self.state
            .lock()
            .quick_apps
            .get(&id)
            .map(|(qa, _)| qa.clone())
            .ok_or_else(not_found)
    }

    async fn list_quick_app_files(&self, id: u64) -> HubResult<Vec<QuickAppFile>> {
        self.enter("list_quick_app_files").await?;
        let state = self.state.lock();
        let (_, files) = state.quick_apps.get(&id).ok_or_else(not_found)?;
        Ok(files
            .iter()
            .map(|f| QuickAppFile::listed(f.name.clone(), f.is_main))
            .collect())
    }

    async fn get_quick_app_file_content(&self, id: u64, name: &str) -> HubResult<Vec<u8>> {
        self.enter("get_quick_app_file_content").await?;
        let state = self.state.lock();
        let (_, files) = state.quick_apps.get(&id).ok_or_else(not_found)?;
        files
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.content.clone().unwrap_or_default().into_bytes())
            .ok_or_else(not_found)
    }

    async fn create_quick_app_file(&self, id: u64, file: &QuickAppFile) -> HubResult<()> {
        self.enter("create_quick_app_file").await?;
        let mut state = self.state.lock();
        let (_, files) = state.quick_apps.get_mut(&id).ok_or_else(not_found)?;
        if files.iter().any(|f| f.name == file.name) {
            return Err(HubError::status(409, reason(409)));
        }
        files.push(file.clone());
        Ok(())
    }

    async fn update_quick_app_file(&self, id: u64, file: &QuickAppFile) -> HubResult<()> {
        self.enter("update_quick_app_file").await?;
        let mut state = self.state.lock();
        let (_, files) = state.quick_apps.get_mut(&id).ok_or_else(not_found)?;
        let existing = files
            .iter_mut()
            .find(|f| f.name == file.name)
            .ok_or_else(not_found)?;
        *existing = file.clone();
        Ok(())
    }

    async fn delete_quick_app_file(&self, id: u64, name: &str) -> HubResult<()> {
        self.enter("delete_quick_app_file").await?;
        let mut state = self.state.lock();
        let (_, files) = state.quick_apps.get_mut(&id).ok_or_else(not_found)?;
        let before = files.len();
        files.retain(|f| f.name != name);
        if files.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn rename_quick_app_file(&self, id: u64, name: &str, new_name: &str) -> HubResult<()> {
        self.enter("rename_quick_app_file").await?;
        let mut state = self.state.lock();
        let (_, files) = state.quick_apps.get_mut(&id).ok_or_else(not_found)?;
        let file = files
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(not_found)?;
        file.name = new_name.to_string();
        Ok(())
    }

    async fn export_quick_app(&self, id: u64) -> HubResult<Value> {
        self.enter("export_quick_app").await?;
        let state = self.state.lock();
        let (qa, files) = state.quick_apps.get(&id).ok_or_else(not_found)?;
        Ok(json!({
            "name": qa.name,
            "type": qa.device_type,
            "files": files,
        }))
    }

    async fn list_scenes(&self) -> HubResult<Vec<Scene>> {
        self.enter("list_scenes").await?;
        Ok(self.state.lock().scenes.values().cloned().collect())
    }

    async fn get_scene(&self, id: u64) -> HubResult<Scene> {
        self.enter("get_scene").await?;
        self.state
            .lock()
            .scenes
            .get(&id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn update_scene(&self, id: u64, patch: &Value) -> HubResult<()> {
        self.enter("update_scene").await?;
        let mut state = self.state.lock();
        let scene = state.scenes.get_mut(&id).ok_or_else(not_found)?;
        let mut merged = serde_json::to_value(&*scene)
            .map_err(|e| HubError::Decode(e.to_string()))?;
        if let (Some(target), Some(fields)) = (merged.as_object_mut(), patch.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        *scene = serde_json::from_value(merged).map_err(|e| HubError::Decode(e.to_string()))?;
        Ok(())
    }

    async fn get_server_info(&self) -> HubResult<ServerInfo> {
        self.enter("get_server_info").await?;
        Ok(self.state.lock().info.clone())
    }

    async fn get_debug_messages(&self, since: i64) -> HubResult<DebugMessages> {
        self.enter("get_debug_messages").await?;
        let state = self.state.lock();
        let mut messages: Vec<DebugMessage> = state
            .messages
            .iter()
            .filter(|m| m.timestamp > since)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let timestamp = messages.first().map(|m| m.timestamp);
        Ok(DebugMessages {
            messages,
            timestamp,
        })
    }

    async fn get_state_events(&self, last: i64) -> HubResult<StateEvents> {
        self.enter("get_state_events").await?;
        let mut state = self.state.lock();
        let events = std::mem::take(&mut state.events);
        state.cursor = state.cursor.max(last) + events.len() as i64;
        Ok(StateEvents {
            last: state.cursor,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_fails() {
        let hub = MockHub::new();
        hub.add_quick_app(QuickApp::new(1, "A", "t"), vec![]);
        hub.fail_next("get_quick_app", 500);

        let err = hub.get_quick_app(1).await.unwrap_err();
        assert_eq!(err, HubError::status(500, "Internal Server Error"));
        assert_eq!(hub.get_quick_app(1).await.unwrap().name, "A");
        assert!(hub.get_quick_app(2).await.unwrap_err().is_not_found());

        assert_eq!(hub.calls(), vec!["get_quick_app"; 3]);
        assert_eq!(hub.trace()[..2], ["begin get_quick_app", "end get_quick_app"]);
    }

    #[tokio::test]
    async fn test_update_scene_merges() {
        let hub = MockHub::new();
        hub.add_scene(Scene::new(3, "Night", "lua", "{}"));
        hub.update_scene(3, &json!({"content": "{\"actions\":\"x\"}"}))
            .await
            .unwrap();
        let scene = hub.scene(3).unwrap();
        assert_eq!(scene.name, "Night");
        assert_eq!(scene.content, "{\"actions\":\"x\"}");
    }

    #[tokio::test]
    async fn test_events_drain() {
        let hub = MockHub::new();
        hub.push_event("DeviceRemovedEvent", 12);
        let first = hub.get_state_events(0).await.unwrap();
        assert_eq!(first.events.len(), 1);
        let second = hub.get_state_events(first.last).await.unwrap();
        assert!(second.events.is_empty());
        assert_eq!(second.last, first.last);
    }
}
