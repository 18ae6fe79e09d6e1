use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use hc3fs_kernel::HubConfig;
use hc3fs_kernel::hub::{
    DebugMessages, HubApi, HubError, HubResult, QuickApp, QuickAppFile, Scene, ServerInfo,
    StateEvents,
};

const API_VERSION_HEADER: &str = "X-Fibaro-Version";
const API_VERSION: &str = "2";

/// Async hub REST client.
///
/// No request timeout is set: a hub that never answers stalls the call that
/// is waiting on it, and nothing else.
#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base: String,
    auth: String,
}

impl HubClient {
    pub fn new(config: &HubConfig) -> HubResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| HubError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base: config.api_base(),
            auth: basic_auth(&config.user, &config.password),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Issue one request. An empty 2xx body is `None`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> HubResult<Option<Value>> {
        let url = self.url(path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(AUTHORIZATION, &self.auth)
            .header(CONTENT_TYPE, "application/json")
            .header(API_VERSION_HEADER, API_VERSION)
            .header(ACCEPT, "*/*");
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HubError::Transport(format!("{method} {path}: {e}")))?;

        let status = response.status();
        tracing::debug!(%method, path, status = status.as_u16(), "hub call");
        if !status.is_success() {
            return Err(HubError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| HubError::Transport(format!("{method} {path}: {e}")))?;
        decode_body(path, &text)
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> HubResult<T> {
        let value = self.call(Method::GET, path, None).await?;
        typed(path, value)
    }

    async fn send(&self, method: Method, path: &str, body: &Value) -> HubResult<()> {
        self.call(method, path, Some(body)).await.map(|_| ())
    }
}

/// `Basic base64(user:password)`.
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Some calls answer 2xx with an empty body.
fn decode_body(path: &str, text: &str) -> HubResult<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| HubError::Decode(format!("{path}: {e}")))
}

fn typed<T: DeserializeOwned>(path: &str, value: Option<Value>) -> HubResult<T> {
    let value = value.ok_or_else(|| HubError::EmptyResponse(path.to_string()))?;
    serde_json::from_value(value).map_err(|e| HubError::Decode(format!("{path}: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> HubResult<Value> {
    serde_json::to_value(value).map_err(|e| HubError::Decode(e.to_string()))
}

#[async_trait]
impl HubApi for HubClient {
    // ========================================================================
    // QuickApps
    // ========================================================================

    async fn list_quick_apps(&self) -> HubResult<Vec<QuickApp>> {
        self.fetch("/devices?interface=quickApp").await
    }

    async fn get_quick_app(&self, id: u64) -> HubResult<QuickApp> {
        self.fetch(&format!("/devices/{id}")).await
    }

    async fn list_quick_app_files(&self, id: u64) -> HubResult<Vec<QuickAppFile>> {
        self.fetch(&format!("/quickApp/{id}/files")).await
    }

    async fn get_quick_app_file_content(&self, id: u64, name: &str) -> HubResult<Vec<u8>> {
        let path = format!("/quickApp/{id}/files/{name}");
        let file: QuickAppFile = self.fetch(&path).await?;
        file.content
            .map(String::into_bytes)
            .ok_or_else(|| HubError::Decode(format!("{path}: no content")))
    }

    async fn create_quick_app_file(&self, id: u64, file: &QuickAppFile) -> HubResult<()> {
        self.send(Method::POST, &format!("/quickApp/{id}/files"), &encode(file)?)
            .await
    }

    async fn update_quick_app_file(&self, id: u64, file: &QuickAppFile) -> HubResult<()> {
        let path = format!("/quickApp/{id}/files/{}", file.name);
        self.send(Method::PUT, &path, &encode(file)?).await
    }

    async fn delete_quick_app_file(&self, id: u64, name: &str) -> HubResult<()> {
        self.call(Method::DELETE, &format!("/quickApp/{id}/files/{name}"), None)
            .await
            .map(|_| ())
    }

    async fn rename_quick_app_file(&self, id: u64, name: &str, new_name: &str) -> HubResult<()> {
        let path = format!("/quickApp/{id}/files/{name}");
        self.send(Method::PUT, &path, &json!({ "name": new_name })).await
    }

    async fn export_quick_app(&self, id: u64) -> HubResult<Value> {
        self.fetch(&format!("/quickApp/export/{id}")).await
    }

    // ========================================================================
    // Scenes
    // ========================================================================

    async fn list_scenes(&self) -> HubResult<Vec<Scene>> {
        self.fetch("/scenes").await
    }

    async fn get_scene(&self, id: u64) -> HubResult<Scene> {
        self.fetch(&format!("/scenes/{id}")).await
    }

    async fn update_scene(&self, id: u64, patch: &Value) -> HubResult<()> {
        self.send(Method::PUT, &format!("/scenes/{id}"), patch).await
    }

    // ========================================================================
    // System
    // ========================================================================

    async fn get_server_info(&self) -> HubResult<ServerInfo> {
        self.fetch("/settings/info/").await
    }

    async fn get_debug_messages(&self, since: i64) -> HubResult<DebugMessages> {
        self.fetch(&format!("/debugMessages?from={since}")).await
    }

    async fn get_state_events(&self, last: i64) -> HubResult<StateEvents> {
        self.fetch(&format!("/refreshStates?last={last}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let client = HubClient::new(&HubConfig::new("http://192.168.1.57/", "admin", "pw")).unwrap();
        assert_eq!(client.base_url(), "http://192.168.1.57/api");
        assert_eq!(client.url("/scenes/7"), "http://192.168.1.57/api/scenes/7");
    }

    #[test]
    fn test_basic_auth() {
        assert_eq!(basic_auth("admin", "admin"), "Basic YWRtaW46YWRtaW4=");
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body("/x", "").unwrap(), None);
        assert_eq!(decode_body("/x", "  \n").unwrap(), None);
        assert_eq!(decode_body("/x", r#"{"a":1}"#).unwrap(), Some(json!({"a": 1})));
        assert!(matches!(decode_body("/x", "<html>"), Err(HubError::Decode(_))));
    }

    #[test]
    fn test_typed_empty_body() {
        let result: HubResult<Vec<Scene>> = typed("/scenes", None);
        assert_eq!(result, Err(HubError::EmptyResponse("/scenes".into())));
    }

    #[test]
    fn test_typed_quick_app_listing() {
        let body = json!([
            {"id": 12, "name": "Lamp", "type": "com.fibaro.binarySwitch", "roomID": 219},
            {"id": 13, "name": "Fan", "type": "com.fibaro.genericDevice"}
        ]);
        let qas: Vec<QuickApp> = typed("/devices", Some(body)).unwrap();
        assert_eq!(qas.len(), 2);
        assert_eq!(qas[0].device_type, "com.fibaro.binarySwitch");
        assert_eq!(qas[0].extra["roomID"], 219);
    }

    #[test]
    fn test_file_payload_shape() {
        let file = QuickAppFile::with_content("utils", false, "-- x");
        let body = encode(&file).unwrap();
        assert_eq!(
            body,
            json!({"name": "utils", "isMain": false, "type": "lua", "isOpen": false, "content": "-- x"})
        );
    }
}
