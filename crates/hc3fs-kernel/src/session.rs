//! Session lifecycle.
//!
//! A [`Session`] owns everything one connection to a hub needs: the shadow
//! cache, the resolver engine, the gate every filesystem verb waits on, the
//! change notifier and the pollers. It is constructed explicitly and passed
//! around; nothing here is global.
//!
//! ```text
//! Session::new  ->  initialise()  ->  use fs() / start_pollers()  ->  shutdown()
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Hc3Config;
use crate::hub::HubApi;
use crate::poller::{ConsoleMessage, LogPoller, PollerHandle, StatePoller};
use crate::resolve::{PathResolver, ResolveContext};
use crate::sync::Gate;
use crate::vfs::{ChangeNotifier, Hc3Fs, Namespace, ShadowCache, VfsError, VfsResult, DEBOUNCE};

pub struct Session {
    config: Hc3Config,
    hub: Arc<dyn HubApi>,
    shadow: Arc<ShadowCache>,
    gate: Arc<Gate>,
    engine: Arc<PathResolver>,
    notifier: Arc<ChangeNotifier>,
    fs: Arc<Hc3Fs>,
    log_poller: Arc<LogPoller>,
    state_poller: Arc<StatePoller>,
    console: Option<mpsc::UnboundedReceiver<ConsoleMessage>>,
    pollers: Vec<PollerHandle>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("hub", &self.config.hub.url)
            .field("shadow", &self.shadow.root())
            .field("ready", &self.gate.is_open())
            .field("pollers", &self.pollers.len())
            .finish()
    }
}

impl Session {
    /// Build a session over a fresh temporary shadow directory. Must be
    /// called inside a tokio runtime. Nothing is visible until
    /// [`initialise`](Self::initialise) opens the gate.
    pub fn new(config: Hc3Config, hub: Arc<dyn HubApi>) -> VfsResult<Self> {
        Self::with_shadow(config, hub, ShadowCache::new()?)
    }

    /// Build a session over an existing shadow cache.
    pub fn with_shadow(
        config: Hc3Config,
        hub: Arc<dyn HubApi>,
        shadow: ShadowCache,
    ) -> VfsResult<Self> {
        let shadow = Arc::new(shadow);
        let gate = Arc::new(Gate::new());
        let notifier = Arc::new(ChangeNotifier::spawn(DEBOUNCE));
        let engine = Arc::new(PathResolver::new(ResolveContext::new(
            hub.clone(),
            shadow.clone(),
        )));
        let fs = Arc::new(Hc3Fs::new(
            hub.clone(),
            engine.clone(),
            gate.clone(),
            notifier.clone(),
        ));

        let (log_poller, console) =
            LogPoller::new(hub.clone(), config.log.interval(), config.log.enabled);
        log_poller.enable_tags(config.log.tags.iter().cloned());
        let state_poller =
            StatePoller::new(hub.clone(), engine.clone(), notifier.clone(), &config.poll);

        tracing::debug!(shadow = %shadow.root().display(), "session created");
        Ok(Self {
            config,
            hub,
            shadow,
            gate,
            engine,
            notifier,
            fs,
            log_poller: Arc::new(log_poller),
            state_poller: Arc::new(state_poller),
            console: Some(console),
            pollers: Vec::new(),
        })
    }

    /// Prepare the shadow tree and open the gate.
    ///
    /// Failing to reach the hub here is not fatal: the tree still opens and
    /// each verb reports its own remote errors.
    pub async fn initialise(&self) -> VfsResult<()> {
        for ns in Namespace::ALL {
            self.shadow.create_dir(&ns.path()).await?;
        }

        match self.hub.get_server_info().await {
            Ok(info) => tracing::info!(
                serial = info.serial_number.as_deref().unwrap_or("?"),
                name = info.hc_name.as_deref().unwrap_or("?"),
                version = info.soft_version.as_deref().unwrap_or("?"),
                "connected to hub"
            ),
            Err(e) => tracing::warn!(error = %e, url = %self.config.hub.url, "hub not reachable"),
        }

        if let Some(path_file) = &self.config.path_file {
            let root = self.shadow.root().display().to_string();
            tokio::fs::write(path_file, root)
                .await
                .map_err(|e| VfsError::io_at(path_file.display().to_string(), e))?;
            tracing::info!(path = %path_file.display(), "shadow root written");
        }

        self.gate.open();
        tracing::info!(shadow = %self.shadow.root().display(), "session ready");
        Ok(())
    }

    /// Spawn the console and state pollers. Calling it again is a no-op.
    pub fn start_pollers(&mut self) {
        if !self.pollers.is_empty() {
            return;
        }
        self.pollers.push(self.log_poller.spawn());
        self.pollers.push(self.state_poller.spawn());
    }

    pub fn fs(&self) -> &Arc<Hc3Fs> {
        &self.fs
    }

    pub fn engine(&self) -> &Arc<PathResolver> {
        &self.engine
    }

    pub fn config(&self) -> &Hc3Config {
        &self.config
    }

    pub fn log_poller(&self) -> &Arc<LogPoller> {
        &self.log_poller
    }

    pub fn state_poller(&self) -> &Arc<StatePoller> {
        &self.state_poller
    }

    /// The console channel. Only the first caller gets it.
    pub fn take_console(&mut self) -> Option<mpsc::UnboundedReceiver<ConsoleMessage>> {
        self.console.take()
    }

    pub fn shadow_root(&self) -> &std::path::Path {
        self.shadow.root()
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_open()
    }

    /// Stop the pollers and the notifier, close the gate and remove the
    /// shadow directory. Teardown failures are logged, not returned.
    pub async fn shutdown(mut self) {
        for handle in self.pollers.drain(..) {
            let name = handle.name();
            if let Err(e) = handle.shutdown().await {
                tracing::warn!(poller = name, error = %e, "poller ended with error");
            }
        }
        self.notifier.shutdown().await;
        self.gate.close();

        if let Err(e) = self.shadow.remove() {
            tracing::warn!(error = %e, "failed to remove shadow directory");
        }
        if let Some(path_file) = &self.config.path_file {
            if let Err(e) = tokio::fs::remove_file(path_file).await {
                tracing::debug!(error = %e, "path file not removed");
            }
        }
        tracing::info!("session closed");
    }
}
