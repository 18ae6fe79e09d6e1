//! Namespace-level resolvers: one shadow directory per remote object.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ResolveContext, Resolver};
use crate::vfs::{object_dir_name, Namespace, VfsResult, VirtualPath};

/// Create the object directories under a namespace. Existing ones are kept.
async fn populate(
    ctx: &ResolveContext,
    path: &VirtualPath,
    objects: impl IntoIterator<Item = (u64, String)>,
) -> VfsResult<usize> {
    ctx.shadow.create_dir(path).await?;
    let mut count = 0;
    for (id, name) in objects {
        ctx.shadow.create_dir(&path.join(&object_dir_name(id, &name))).await?;
        count += 1;
    }
    Ok(count)
}

/// Lists QuickApps once per session (or per resync).
pub struct QuickAppsResolver {
    ctx: ResolveContext,
    initialised: AtomicBool,
}

impl QuickAppsResolver {
    pub fn new(ctx: ResolveContext) -> Self {
        Self {
            ctx,
            initialised: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Resolver for QuickAppsResolver {
    async fn resolve(&self, path: &VirtualPath, _read: bool) -> VfsResult<()> {
        if self.initialised.load(Ordering::Acquire) {
            return Ok(());
        }
        let qas = self.ctx.hub.list_quick_apps().await?;
        let count = populate(&self.ctx, path, qas.into_iter().map(|qa| (qa.id, qa.name))).await?;
        self.initialised.store(true, Ordering::Release);
        tracing::debug!(path = %path, count, "quickapps resolved");
        Ok(())
    }

    fn forget(&self, path: &VirtualPath) {
        if *path == Namespace::QuickApps.path() {
            self.reset();
        }
    }

    fn reset(&self) {
        self.initialised.store(false, Ordering::Release);
    }
}

/// Lists scenes once per session (or per resync).
pub struct ScenesResolver {
    ctx: ResolveContext,
    initialised: AtomicBool,
}

impl ScenesResolver {
    pub fn new(ctx: ResolveContext) -> Self {
        Self {
            ctx,
            initialised: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Resolver for ScenesResolver {
    async fn resolve(&self, path: &VirtualPath, _read: bool) -> VfsResult<()> {
        if self.initialised.load(Ordering::Acquire) {
            return Ok(());
        }
        let scenes = self.ctx.hub.list_scenes().await?;
        let count = populate(&self.ctx, path, scenes.into_iter().map(|s| (s.id, s.name))).await?;
        self.initialised.store(true, Ordering::Release);
        tracing::debug!(path = %path, count, "scenes resolved");
        Ok(())
    }

    fn forget(&self, path: &VirtualPath) {
        if *path == Namespace::Scenes.path() {
            self.reset();
        }
    }

    fn reset(&self) {
        self.initialised.store(false, Ordering::Release);
    }
}
