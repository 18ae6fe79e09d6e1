//! Leaf resolver: swaps placeholders for real content on first read.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ResolveContext, Resolver};
use crate::vfs::{parse_sentinel, VfsError, VfsResult, VirtualPath};

#[derive(Debug, Clone, Copy, Default)]
struct FileInfo {
    fetched: bool,
}

/// Checks existence on listing and fetches script content on read.
pub struct FileResolver {
    ctx: ResolveContext,
    resolved: DashMap<VirtualPath, FileInfo>,
}

impl FileResolver {
    pub fn new(ctx: ResolveContext) -> Self {
        Self {
            ctx,
            resolved: DashMap::new(),
        }
    }

    /// Replace a placeholder with the remote content. Files that already
    /// hold real content are left alone.
    async fn fetch(&self, path: &VirtualPath) -> VfsResult<()> {
        let data = self.ctx.shadow.read(path).await?;
        if let Some((id, name)) = parse_sentinel(&data) {
            let content = self.ctx.hub.get_quick_app_file_content(id, &name).await?;
            self.ctx.shadow.write(path, &content).await?;
            tracing::debug!(path = %path, id, file = %name, bytes = content.len(), "file fetched");
        }
        Ok(())
    }
}

#[async_trait]
impl Resolver for FileResolver {
    async fn resolve(&self, path: &VirtualPath, read: bool) -> VfsResult<()> {
        let known = self.resolved.get(path).map(|info| info.fetched);
        match known {
            Some(true) => return Ok(()),
            Some(false) if !read => return Ok(()),
            Some(false) => {}
            None => {
                if !self.ctx.shadow.exists(path).await {
                    return Err(VfsError::not_found(path.to_string()));
                }
            }
        }

        if read {
            self.fetch(path).await?;
        }
        self.resolved.insert(path.clone(), FileInfo { fetched: read });
        Ok(())
    }

    fn mark_resolved(&self, path: &VirtualPath) {
        self.resolved.insert(path.clone(), FileInfo { fetched: true });
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
    use crate::testing::MockHub;
    use crate::vfs::{sentinel, ShadowCache};
    use crate::hub::{QuickApp, QuickAppFile};
    use std::sync::Arc;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    async fn setup() -> (Arc<MockHub>, ResolveContext, VirtualPath) {
        let hub = Arc::new(MockHub::new());
        hub.add_quick_app(
            QuickApp::new(12, "Lamp", "com.fibaro.binarySwitch"),
            vec![QuickAppFile::with_content("main", true, "print('on')")],
        );
        let ctx = ResolveContext::new(hub.clone(), Arc::new(ShadowCache::new().unwrap()));
        let path = vp("/QuickApps/12_Lamp/main.lua");
        ctx.shadow.create_dir(&vp("/QuickApps/12_Lamp")).await.unwrap();
        ctx.shadow.write(&path, sentinel(12, "main").as_bytes()).await.unwrap();
        (hub, ctx, path)
    }

    #[tokio::test]
    async fn test_listing_does_not_fetch() {
        let (hub, ctx, path) = setup().await;
        let resolver = FileResolver::new(ctx.clone());

        resolver.resolve(&path, false).await.unwrap();
        resolver.resolve(&path, false).await.unwrap();
        assert_eq!(hub.count("get_quick_app_file_content"), 0);
        assert_eq!(ctx.shadow.read(&path).await.unwrap(), sentinel(12, "main").as_bytes());
    }

    #[tokio::test]
    async fn test_read_fetches_once() {
        let (hub, ctx, path) = setup().await;
        let resolver = FileResolver::new(ctx.clone());

        resolver.resolve(&path, false).await.unwrap();
        resolver.resolve(&path, true).await.unwrap();
        resolver.resolve(&path, true).await.unwrap();

        assert_eq!(hub.count("get_quick_app_file_content"), 1);
        assert_eq!(ctx.shadow.read(&path).await.unwrap(), b"print('on')");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let (hub, ctx, _) = setup().await;
        let resolver = FileResolver::new(ctx);

        let err = resolver
            .resolve(&vp("/QuickApps/12_Lamp/ghost.lua"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert_eq!(hub.count("get_quick_app_file_content"), 0);
    }

    #[tokio::test]
    async fn test_marked_file_is_not_fetched() {
        let (hub, ctx, path) = setup().await;
        let resolver = FileResolver::new(ctx);

        resolver.mark_resolved(&path);
        resolver.resolve(&path, true).await.unwrap();
        assert_eq!(hub.count("get_quick_app_file_content"), 0);

        resolver.forget(&vp("/QuickApps/12_Lamp"));
        resolver.resolve(&path, true).await.unwrap();
        assert_eq!(hub.count("get_quick_app_file_content"), 1);
    }
}
