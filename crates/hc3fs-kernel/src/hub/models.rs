//! Typed views of the hub's JSON resources.
//!
//! Every object model keeps the fields it does not name in `extra`, so
//! serializing a model back reproduces the hub's full record. That is what
//! lands in the `.rsrc.json` shadow files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use strum::EnumString;

/// A QuickApp device as listed by `/devices?interface=quickApp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickApp {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuickApp {
    pub fn new(id: u64, name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            device_type: device_type.into(),
            created: 0,
            modified: 0,
            extra: Map::new(),
        }
    }
}

/// One script file of a QuickApp.
///
/// Listings carry only `name`/`isMain`; `content` is present when a single
/// file is fetched or pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAppFile {
    pub name: String,
    #[serde(default)]
    pub is_main: bool,
    #[serde(rename = "type", default = "lua_type")]
    pub file_type: String,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

fn lua_type() -> String {
    "lua".to_string()
}

impl QuickAppFile {
    /// A listing entry (no content).
    pub fn listed(name: impl Into<String>, is_main: bool) -> Self {
        Self {
            name: name.into(),
            is_main,
            file_type: lua_type(),
            is_open: false,
            content: None,
        }
    }

    /// A file carrying content, as pushed to the hub.
    pub fn with_content(name: impl Into<String>, is_main: bool, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::listed(name, is_main)
        }
    }
}

/// Scene flavour, from the scene's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SceneKind {
    Lua,
    Scenario,
    Json,
    #[strum(disabled)]
    Unknown,
}

impl SceneKind {
    /// Label shown in decorations; block scenes are called `block`.
    pub fn label(&self) -> &'static str {
        match self {
            SceneKind::Lua => "lua",
            SceneKind::Scenario => "scenario",
            SceneKind::Json => "block",
            SceneKind::Unknown => "unknown",
        }
    }

    /// Script scenes split their content into conditions and actions.
    pub fn is_script(&self) -> bool {
        matches!(self, SceneKind::Lua | SceneKind::Scenario)
    }
}

/// An automation scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub scene_type: String,
    /// Scene body, itself a JSON document encoded as a string.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Scene {
    pub fn new(id: u64, name: impl Into<String>, scene_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            scene_type: scene_type.into(),
            content: content.into(),
            created: 0,
            updated: 0,
            extra: Map::new(),
        }
    }

    pub fn kind(&self) -> SceneKind {
        SceneKind::from_str(&self.scene_type).unwrap_or(SceneKind::Unknown)
    }

    /// Decode the embedded content document.
    pub fn content_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.content)
    }
}

/// Answer of `/settings/info/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub hc_name: Option<String>,
    #[serde(default)]
    pub soft_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Answer of `/debugMessages?from=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugMessages {
    /// Newest first, as the hub sends them.
    #[serde(default)]
    pub messages: Vec<DebugMessage>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugMessage {
    #[serde(default)]
    pub id: Option<u64>,
    pub timestamp: i64,
    pub tag: String,
    /// `debug`, `trace`, `warning` or `error`.
    #[serde(rename = "type")]
    pub level: String,
    pub message: String,
}

/// Answer of `/refreshStates?last=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateEvents {
    pub last: i64,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// An event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>, id: u64) -> Self {
        Self {
            kind: kind.into(),
            data: serde_json::json!({ "id": id }),
        }
    }

    /// Classify the event.
    pub fn event(&self) -> RemoteEvent {
        let id = self.data.get("id").and_then(Value::as_u64);
        match (self.kind.as_str(), id) {
            ("QuickAppFilesChangedEvent", Some(id)) => RemoteEvent::FilesChanged { id },
            ("DeviceCreatedEvent", Some(id)) => RemoteEvent::DeviceCreated { id },
            ("DeviceRemovedEvent", Some(id)) => RemoteEvent::DeviceRemoved { id },
            _ => RemoteEvent::Other {
                kind: self.kind.clone(),
            },
        }
    }
}

/// The remote changes the state poller reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    FilesChanged { id: u64 },
    DeviceCreated { id: u64 },
    DeviceRemoved { id: u64 },
    Other { kind: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_app_keeps_unknown_fields() {
        let raw = r#"{"id":12,"name":"Lamp","type":"com.fibaro.binarySwitch","created":1,"modified":2,"roomID":5}"#;
        let qa: QuickApp = serde_json::from_str(raw).unwrap();
        assert_eq!(qa.id, 12);
        assert_eq!(qa.extra.get("roomID"), Some(&Value::from(5)));

        let back = serde_json::to_value(&qa).unwrap();
        assert_eq!(back["roomID"], 5);
        assert_eq!(back["type"], "com.fibaro.binarySwitch");
    }

    #[test]
    fn test_file_listing_defaults() {
        let files: Vec<QuickAppFile> =
            serde_json::from_str(r#"[{"name":"main","isMain":true},{"name":"utils"}]"#).unwrap();
        assert!(files[0].is_main);
        assert!(!files[1].is_main);
        assert_eq!(files[1].file_type, "lua");
        assert!(files[1].content.is_none());

        let pushed = serde_json::to_value(QuickAppFile::with_content("utils", false, "x=1")).unwrap();
        assert_eq!(pushed["isMain"], false);
        assert_eq!(pushed["isOpen"], false);
        assert_eq!(pushed["content"], "x=1");
    }

    #[test]
    fn test_scene_kind() {
        assert_eq!(Scene::new(1, "a", "lua", "{}").kind(), SceneKind::Lua);
        assert_eq!(Scene::new(1, "a", "JSON", "{}").kind(), SceneKind::Json);
        assert_eq!(Scene::new(1, "a", "magic", "{}").kind(), SceneKind::Unknown);
        assert_eq!(SceneKind::Json.label(), "block");
        assert!(SceneKind::Scenario.is_script());
    }

    #[test]
    fn test_event_classification() {
        assert_eq!(
            RawEvent::new("DeviceRemovedEvent", 12).event(),
            RemoteEvent::DeviceRemoved { id: 12 }
        );
        assert_eq!(
            RawEvent::new("QuickAppFilesChangedEvent", 7).event(),
            RemoteEvent::FilesChanged { id: 7 }
        );

        let wire: StateEvents = serde_json::from_str(
            r#"{"last":42,"events":[{"type":"DevicePropertyUpdatedEvent","data":{"id":3,"property":"value"}}]}"#,
        )
        .unwrap();
        assert_eq!(wire.last, 42);
        assert!(matches!(wire.events[0].event(), RemoteEvent::Other { .. }));
    }
}
