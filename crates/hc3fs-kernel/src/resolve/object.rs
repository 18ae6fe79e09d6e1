//! Object-level resolvers: regenerate an object's directory from the hub.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use super::{format_timestamp, value_text, ObjectKind, ObjectRecord, ResolveContext, Resolver};
use crate::hub::{HubError, QuickApp, QuickAppFile, SceneKind};
use crate::vfs::{
    is_segment, script_file_name, sentinel, Decoration, VfsError, VfsResult, VirtualPath, ACTIONS_FILE,
    BLOCK_FILE, CONDITIONS_FILE, RSRC_FILE, RUN_FILE,
};

/// Check the directory was listed and return the object id it names.
async fn prepare_dir(ctx: &ResolveContext, path: &VirtualPath) -> VfsResult<u64> {
    if !ctx.shadow.exists(path).await {
        return Err(VfsError::not_found(path.to_string()));
    }
    path.object_id()
        .ok_or_else(|| VfsError::not_found(path.to_string()))
}

async fn recreate_dir(ctx: &ResolveContext, path: &VirtualPath) -> VfsResult<()> {
    ctx.shadow.remove_dir_all(path).await?;
    ctx.shadow.create_dir(path).await
}

fn pretty<T: Serialize>(value: &T) -> VfsResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Manifest an external runner uses to load the QuickApp from the shadow
/// directory.
pub(crate) fn run_manifest(path: &VirtualPath, qa: &QuickApp, files: &[QuickAppFile]) -> String {
    let mut out = String::new();
    out.push_str(&format!("--%%root={path}/\n"));
    out.push_str(&format!("--%%name={}\n", qa.name));
    out.push_str(&format!("--%%id={}\n", qa.id));
    out.push_str(&format!("--%%type={}\n", qa.device_type));
    for f in files {
        let alias = if f.name == "main" { "main2" } else { f.name.as_str() };
        out.push_str(&format!("--%%file={}.lua,{alias};\n", f.name));
    }
    out
}

/// Writes a QuickApp's scripts (as placeholders), `.rsrc.json` and
/// `.run.lua`.
pub struct QuickAppResolver {
    ctx: ResolveContext,
    resolved: DashMap<VirtualPath, ObjectRecord>,
}

impl QuickAppResolver {
    pub fn new(ctx: ResolveContext) -> Self {
        Self {
            ctx,
            resolved: DashMap::new(),
        }
    }
}

#[async_trait]
impl Resolver for QuickAppResolver {
    async fn resolve(&self, path: &VirtualPath, _read: bool) -> VfsResult<()> {
        if self.resolved.contains_key(path) {
            return Ok(());
        }
        let id = prepare_dir(&self.ctx, path).await?;
        let qa = self.ctx.hub.get_quick_app(id).await?;
        let mut files = self.ctx.hub.list_quick_app_files(id).await?;
        files.retain(|f| {
            let ok = is_segment(&script_file_name(&f.name));
            if !ok {
                tracing::warn!(path = %path, file = %f.name, "skipping unrepresentable file name");
            }
            ok
        });

        recreate_dir(&self.ctx, path).await?;
        let shadow = &self.ctx.shadow;
        for f in &files {
            shadow
                .write(&path.join(&script_file_name(&f.name)), sentinel(id, &f.name).as_bytes())
                .await?;
        }
        let raw = serde_json::to_value(&qa)?;
        shadow.write(&path.join(RSRC_FILE), pretty(&raw)?.as_bytes()).await?;
        shadow
            .write(&path.join(RUN_FILE), run_manifest(path, &qa, &files).as_bytes())
            .await?;

        tracing::debug!(path = %path, id, files = files.len(), "quickapp resolved");
        self.resolved.insert(
            path.clone(),
            ObjectRecord {
                id,
                name: qa.name,
                kind: ObjectKind::QuickApp {
                    device_type: qa.device_type,
                },
                raw,
                files,
            },
        );
        Ok(())
    }

    fn decorate(&self, path: &VirtualPath) -> Option<Decoration> {
        let record = self.resolved.get(path)?;
        let ObjectKind::QuickApp { device_type } = &record.kind else {
            return None;
        };
        let created = record.raw.get("created").and_then(|v| v.as_i64()).unwrap_or(0);
        let modified = record.raw.get("modified").and_then(|v| v.as_i64()).unwrap_or(0);
        Some(Decoration {
            badge: None,
            tooltip: Some(format!(
                "type:{device_type}\ncreated:{}\nmodified:{}",
                format_timestamp(created),
                format_timestamp(modified)
            )),
            propagate: true,
        })
    }

    fn object(&self, path: &VirtualPath) -> Option<ObjectRecord> {
        self.resolved.get(path).map(|r| r.value().clone())
    }

    fn forget(&self, path: &VirtualPath) {
        self.resolved.retain(|k, _| !k.starts_with(path));
    }

    fn reset(&self) {
        self.resolved.clear();
    }
}

/// Writes a scene's `.rsrc.json` and its body files.
pub struct SceneResolver {
    ctx: ResolveContext,
    resolved: DashMap<VirtualPath, ObjectRecord>,
}

impl SceneResolver {
    pub fn new(ctx: ResolveContext) -> Self {
        Self {
            ctx,
            resolved: DashMap::new(),
        }
    }
}

#[async_trait]
impl Resolver for SceneResolver {
    async fn resolve(&self, path: &VirtualPath, _read: bool) -> VfsResult<()> {
        if self.resolved.contains_key(path) {
            return Ok(());
        }
        let id = prepare_dir(&self.ctx, path).await?;
        let scene = self.ctx.hub.get_scene(id).await?;
        let kind = scene.kind();

        recreate_dir(&self.ctx, path).await?;
        let shadow = &self.ctx.shadow;
        let raw = serde_json::to_value(&scene)?;
        shadow.write(&path.join(RSRC_FILE), pretty(&raw)?.as_bytes()).await?;

        match kind {
            SceneKind::Lua | SceneKind::Scenario => {
                let content = scene
                    .content_json()
                    .map_err(|e| HubError::Decode(format!("scene {id} content: {e}")))?;
                shadow
                    .write(
                        &path.join(CONDITIONS_FILE),
                        value_text(content.get("conditions")).as_bytes(),
                    )
                    .await?;
                shadow
                    .write(
                        &path.join(ACTIONS_FILE),
                        value_text(content.get("actions")).as_bytes(),
                    )
                    .await?;
            }
            SceneKind::Json => {
                let content = scene
                    .content_json()
                    .map_err(|e| HubError::Decode(format!("scene {id} content: {e}")))?;
                shadow.write(&path.join(BLOCK_FILE), pretty(&content)?.as_bytes()).await?;
            }
            SceneKind::Unknown => {
                tracing::debug!(path = %path, kind = %scene.scene_type, "scene type has no body files");
            }
        }

        tracing::debug!(path = %path, id, kind = ?kind, "scene resolved");
        self.resolved.insert(
            path.clone(),
            ObjectRecord {
                id,
                name: scene.name,
                kind: ObjectKind::Scene { kind },
                raw,
                files: Vec::new(),
            },
        );
        Ok(())
    }

    fn decorate(&self, path: &VirtualPath) -> Option<Decoration> {
        let record = self.resolved.get(path)?;
        let kind = record.scene_kind()?;
        let label = match kind {
            SceneKind::Unknown => record
                .raw
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            other => other.label().to_string(),
        };
        let created = record.raw.get("created").and_then(|v| v.as_i64()).unwrap_or(0);
        let updated = record.raw.get("updated").and_then(|v| v.as_i64()).unwrap_or(0);
        Some(Decoration {
            badge: label.chars().next().map(|c| c.to_uppercase().to_string()),
            tooltip: Some(format!(
                "type:{label}\ncreated:{}\nmodified:{}",
                format_timestamp(created),
                format_timestamp(updated)
            )),
            propagate: true,
        })
    }

    fn object(&self, path: &VirtualPath) -> Option<ObjectRecord> {
        self.resolved.get(path).map(|r| r.value().clone())
    }

    fn forget(&self, path: &VirtualPath) {
        self.resolved.retain(|k, _| !k.starts_with(path));
    }

    fn reset(&self) {
        self.resolved.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Scene;
    use crate::testing::MockHub;
    use crate::vfs::ShadowCache;
    use std::sync::Arc;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    async fn ctx_with_dir(hub: &Arc<MockHub>, dir: &str) -> ResolveContext {
        let ctx = ResolveContext::new(hub.clone(), Arc::new(ShadowCache::new().unwrap()));
        ctx.shadow.create_dir(&vp(dir)).await.unwrap();
        ctx
    }

    #[test]
    fn test_run_manifest() {
        let qa = QuickApp::new(12, "Lamp", "com.fibaro.binarySwitch");
        let files = vec![
            QuickAppFile::listed("main", true),
            QuickAppFile::listed("utils", false),
        ];
        let manifest = run_manifest(&vp("/QuickApps/12_Lamp"), &qa, &files);
        assert_eq!(
            manifest,
            "--%%root=/QuickApps/12_Lamp/\n\
             --%%name=Lamp\n\
             --%%id=12\n\
             --%%type=com.fibaro.binarySwitch\n\
             --%%file=main.lua,main2;\n\
             --%%file=utils.lua,utils;\n"
        );
    }

    #[tokio::test]
    async fn test_quick_app_writes_placeholders() {
        let hub = Arc::new(MockHub::new());
        hub.add_quick_app(
            QuickApp::new(12, "Lamp", "com.fibaro.binarySwitch"),
            vec![
                QuickAppFile::with_content("main", true, "print('on')"),
                QuickAppFile::with_content("utils", false, "x = 1"),
            ],
        );
        let ctx = ctx_with_dir(&hub, "/QuickApps/12_Lamp").await;
        let resolver = QuickAppResolver::new(ctx.clone());
        let dir = vp("/QuickApps/12_Lamp");

        resolver.resolve(&dir, false).await.unwrap();
        resolver.resolve(&dir, true).await.unwrap();
        assert_eq!(hub.count("get_quick_app"), 1);
        assert_eq!(hub.count("get_quick_app_file_content"), 0);

        let placeholder = ctx.shadow.read(&dir.join("utils.lua")).await.unwrap();
        assert_eq!(placeholder, sentinel(12, "utils").as_bytes());

        let rsrc: serde_json::Value =
            serde_json::from_slice(&ctx.shadow.read(&dir.join(RSRC_FILE)).await.unwrap()).unwrap();
        assert_eq!(rsrc["id"], 12);

        let record = resolver.object(&dir).unwrap();
        assert!(record.is_main("main"));
        let deco = resolver.decorate(&dir).unwrap();
        assert!(deco.propagate);
        assert!(deco.tooltip.unwrap().starts_with("type:com.fibaro.binarySwitch\n"));
    }

    #[tokio::test]
    async fn test_unlisted_dir_is_not_found() {
        let hub = Arc::new(MockHub::new());
        let ctx = ResolveContext::new(hub.clone(), Arc::new(ShadowCache::new().unwrap()));
        let resolver = QuickAppResolver::new(ctx);

        let err = resolver.resolve(&vp("/QuickApps/99_Ghost"), false).await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert_eq!(hub.count("get_quick_app"), 0);
    }

    #[tokio::test]
    async fn test_forget_regenerates_file_set() {
        let hub = Arc::new(MockHub::new());
        hub.add_quick_app(
            QuickApp::new(5, "Fan", "com.fibaro.genericDevice"),
            vec![QuickAppFile::with_content("main", true, "")],
        );
        let ctx = ctx_with_dir(&hub, "/QuickApps/5_Fan").await;
        let resolver = QuickAppResolver::new(ctx.clone());
        let dir = vp("/QuickApps/5_Fan");
        resolver.resolve(&dir, false).await.unwrap();

        ctx.shadow.write(&dir.join("stale.lua"), b"old").await.unwrap();
        resolver.forget(&dir);
        resolver.resolve(&dir, false).await.unwrap();

        assert!(!ctx.shadow.exists(&dir.join("stale.lua")).await);
        assert_eq!(hub.count("get_quick_app"), 2);
    }

    #[tokio::test]
    async fn test_lua_scene_files() {
        let hub = Arc::new(MockHub::new());
        let content = serde_json::json!({"conditions": "return true", "actions": "fibaro.call(1,'on')"});
        hub.add_scene(Scene::new(3, "Night", "lua", content.to_string()));
        let ctx = ctx_with_dir(&hub, "/Scenes/3_Night").await;
        let resolver = SceneResolver::new(ctx.clone());
        let dir = vp("/Scenes/3_Night");

        resolver.resolve(&dir, false).await.unwrap();
        assert_eq!(ctx.shadow.read(&dir.join(CONDITIONS_FILE)).await.unwrap(), b"return true");
        assert_eq!(
            ctx.shadow.read(&dir.join(ACTIONS_FILE)).await.unwrap(),
            b"fibaro.call(1,'on')"
        );
        assert!(!ctx.shadow.exists(&dir.join(BLOCK_FILE)).await);

        let deco = resolver.decorate(&dir).unwrap();
        assert_eq!(deco.badge.as_deref(), Some("L"));
    }

    #[tokio::test]
    async fn test_block_scene_files() {
        let hub = Arc::new(MockHub::new());
        hub.add_scene(Scene::new(4, "Morning", "json", r#"[{"type":"trigger"}]"#));
        let ctx = ctx_with_dir(&hub, "/Scenes/4_Morning").await;
        let resolver = SceneResolver::new(ctx.clone());
        let dir = vp("/Scenes/4_Morning");

        resolver.resolve(&dir, false).await.unwrap();
        let block: serde_json::Value =
            serde_json::from_slice(&ctx.shadow.read(&dir.join(BLOCK_FILE)).await.unwrap()).unwrap();
        assert_eq!(block[0]["type"], "trigger");
        assert!(!ctx.shadow.exists(&dir.join(CONDITIONS_FILE)).await);

        let deco = resolver.decorate(&dir).unwrap();
        assert_eq!(deco.badge.as_deref(), Some("B"));
        assert!(deco.tooltip.unwrap().starts_with("type:block\n"));
        assert!(resolver.decorate(&vp("/Scenes/9_Other")).is_none());
    }
}
