//! Lazy, path-driven materialization of the shadow cache.
//!
//! Each namespace owns a chain of resolvers, one per path depth:
//!
//! | depth | resolver                                  | materializes            |
//! |-------|-------------------------------------------|-------------------------|
//! | 1     | [`QuickAppsResolver`] / [`ScenesResolver`] | one directory per object |
//! | 2     | [`QuickAppResolver`] / [`SceneResolver`]   | the object's files       |
//! | 3     | [`FileResolver`]                           | script content on read   |
//!
//! [`PathResolver`] walks a path's prefixes through the chain under one
//! [`Lock`], so no two resolutions interleave their remote fetches. Every
//! resolver remembers what it already resolved; asking again is a no-op
//! until the path is invalidated.

mod collection;
mod file;
mod object;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::hub::{HubApi, QuickAppFile, Scene, SceneKind};
use crate::sync::Lock;
use crate::vfs::{Decoration, Namespace, ShadowCache, VfsError, VfsResult, VirtualPath};

pub use collection::{QuickAppsResolver, ScenesResolver};
pub use file::FileResolver;
pub use object::{QuickAppResolver, SceneResolver};

/// What resolvers need to reach the hub and the shadow cache.
#[derive(Clone)]
pub struct ResolveContext {
    pub hub: Arc<dyn HubApi>,
    pub shadow: Arc<ShadowCache>,
}

impl ResolveContext {
    pub fn new(hub: Arc<dyn HubApi>, shadow: Arc<ShadowCache>) -> Self {
        Self { hub, shadow }
    }
}

/// Remote object behind a resolved object directory.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    QuickApp { device_type: String },
    Scene { kind: SceneKind },
}

/// Record an object resolver captured for a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: u64,
    pub name: String,
    pub kind: ObjectKind,
    /// Full remote JSON, as written to `.rsrc.json`.
    pub raw: Value,
    /// QuickApp script listing; empty for scenes.
    pub files: Vec<QuickAppFile>,
}

impl ObjectRecord {
    pub fn is_quick_app(&self) -> bool {
        matches!(self.kind, ObjectKind::QuickApp { .. })
    }

    pub fn scene_kind(&self) -> Option<SceneKind> {
        match self.kind {
            ObjectKind::Scene { kind } => Some(kind),
            ObjectKind::QuickApp { .. } => None,
        }
    }

    /// Listing entry for a remote file name.
    pub fn file(&self, remote: &str) -> Option<&QuickAppFile> {
        self.files.iter().find(|f| f.name == remote)
    }

    pub fn is_main(&self, remote: &str) -> bool {
        self.file(remote).is_some_and(|f| f.is_main)
    }

    /// Decode the raw record back into a scene.
    pub fn scene(&self) -> VfsResult<Scene> {
        serde_json::from_value(self.raw.clone())
            .map_err(|e| VfsError::malformed(format!("scene {}: {e}", self.id)))
    }
}

/// One layer of the resolver chain.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Materialize `path`. Idempotent per path; only the first call (or the
    /// first read, for files) reaches the hub.
    async fn resolve(&self, path: &VirtualPath, read: bool) -> VfsResult<()>;

    /// Presentation for a resolved path. Never performs I/O.
    fn decorate(&self, _path: &VirtualPath) -> Option<Decoration> {
        None
    }

    /// Remote record for an object directory this resolver resolved.
    fn object(&self, _path: &VirtualPath) -> Option<ObjectRecord> {
        None
    }

    /// Record `path` as fully resolved without asking the hub.
    fn mark_resolved(&self, _path: &VirtualPath) {}

    /// Drop the state for `path` and everything beneath it.
    fn forget(&self, path: &VirtualPath);

    /// Drop all state.
    fn reset(&self);
}

/// The path-resolution engine.
pub struct PathResolver {
    chains: HashMap<Namespace, Vec<Arc<dyn Resolver>>>,
    lock: Lock,
    shadow: Arc<ShadowCache>,
}

impl PathResolver {
    /// Engine with the standard chain for every namespace.
    pub fn new(ctx: ResolveContext) -> Self {
        let mut chains: HashMap<Namespace, Vec<Arc<dyn Resolver>>> = HashMap::new();
        chains.insert(
            Namespace::QuickApps,
            vec![
                Arc::new(QuickAppsResolver::new(ctx.clone())),
                Arc::new(QuickAppResolver::new(ctx.clone())),
                Arc::new(FileResolver::new(ctx.clone())),
            ],
        );
        chains.insert(
            Namespace::Scenes,
            vec![
                Arc::new(ScenesResolver::new(ctx.clone())),
                Arc::new(SceneResolver::new(ctx.clone())),
                Arc::new(FileResolver::new(ctx.clone())),
            ],
        );
        Self::with_chains(ctx.shadow, chains)
    }

    pub fn with_chains(
        shadow: Arc<ShadowCache>,
        chains: HashMap<Namespace, Vec<Arc<dyn Resolver>>>,
    ) -> Self {
        Self {
            chains,
            lock: Lock::new(),
            shadow,
        }
    }

    pub fn shadow(&self) -> &Arc<ShadowCache> {
        &self.shadow
    }

    fn chain(&self, path: &VirtualPath) -> VfsResult<&[Arc<dyn Resolver>]> {
        path.namespace()
            .and_then(|ns| self.chains.get(&ns))
            .map(Vec::as_slice)
            .ok_or_else(|| VfsError::not_found(path.to_string()))
    }

    /// Resolve every prefix of `path`, outermost first.
    ///
    /// Returns the resolver of the final depth, or `None` for the root.
    pub async fn resolve_path(
        &self,
        path: &VirtualPath,
        read: bool,
    ) -> VfsResult<Option<Arc<dyn Resolver>>> {
        if path.is_root() {
            return Ok(None);
        }
        let chain = self.chain(path)?;
        if path.depth() > chain.len() {
            return Err(VfsError::not_found(path.to_string()));
        }

        self.lock
            .acquire(async {
                for (i, resolver) in chain.iter().take(path.depth()).enumerate() {
                    let prefix = path.prefix(i + 1);
                    tracing::trace!(path = %prefix, depth = i + 1, read, "resolving");
                    resolver.resolve(&prefix, read).await?;
                }
                Ok::<_, VfsError>(())
            })
            .await?;

        Ok(chain.get(path.depth() - 1).cloned())
    }

    /// Record of the object directory `path` lives in, if resolved.
    pub fn object_record(&self, path: &VirtualPath) -> Option<ObjectRecord> {
        let dir = path.object_dir()?;
        let chain = self.chain(&dir).ok()?;
        chain.get(1)?.object(&dir)
    }

    /// Cached presentation for a resolved path.
    pub fn decorate(&self, path: &VirtualPath) -> Option<Decoration> {
        if path.is_root() {
            return None;
        }
        let chain = self.chain(path).ok()?;
        chain.get(path.depth() - 1)?.decorate(path)
    }

    /// Mark a leaf as holding real content.
    pub fn mark_fetched(&self, path: &VirtualPath) {
        if let Ok(chain) = self.chain(path) {
            if let Some(resolver) = chain.get(path.depth().saturating_sub(1)) {
                resolver.mark_resolved(path);
            }
        }
    }

    /// Forget `path` and its subtree in every layer, so the next access
    /// regenerates it from the hub.
    pub async fn invalidate(&self, path: &VirtualPath) -> VfsResult<()> {
        let chain = self.chain(path)?;
        self.lock
            .acquire(async {
                for resolver in chain {
                    resolver.forget(path);
                }
            })
            .await;
        tracing::debug!(path = %path, "invalidated");
        Ok(())
    }

    /// Drop everything known about a namespace and empty its shadow
    /// directory. The next access re-lists it from the hub.
    pub async fn resync(&self, ns: Namespace) -> VfsResult<()> {
        let dir = ns.path();
        let chain = self.chain(&dir)?;
        self.lock
            .acquire(async {
                for resolver in chain {
                    resolver.reset();
                }
                self.shadow.remove_dir_all(&dir).await?;
                self.shadow.create_dir(&dir).await
            })
            .await?;
        tracing::info!(namespace = %ns, "namespace resynced");
        Ok(())
    }
}

/// Text form of a JSON value: strings unquoted, null empty.
pub(crate) fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Local wall-clock rendering of a hub timestamp (seconds).
pub(crate) fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}
