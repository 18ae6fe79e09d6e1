//! Remote state poller.
//!
//! Long-polls `/refreshStates`. Any QuickApp lifecycle event resyncs the
//! QuickApps namespace once per batch and notifies the host.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{PollerError, PollerHandle};
use crate::config::PollConfig;
use crate::hub::{HubApi, RemoteEvent};
use crate::resolve::PathResolver;
use crate::vfs::{parse_object_id, ChangeNotifier, FileChangeEvent, FileType, Namespace, VirtualPath};

pub struct StatePoller {
    hub: Arc<dyn HubApi>,
    engine: Arc<PathResolver>,
    notifier: Arc<ChangeNotifier>,
    interval: Duration,
    max_errors: u32,
}

impl StatePoller {
    pub fn new(
        hub: Arc<dyn HubApi>,
        engine: Arc<PathResolver>,
        notifier: Arc<ChangeNotifier>,
        config: &PollConfig,
    ) -> Self {
        Self {
            hub,
            engine,
            notifier,
            interval: config.interval(),
            max_errors: config.max_errors.max(1),
        }
    }

    /// Object directory currently mirrored for QuickApp `id`.
    async fn known_dir(&self, id: u64) -> Option<VirtualPath> {
        let ns = Namespace::QuickApps.path();
        let entries = self.engine.shadow().read_dir(&ns).await.ok()?;
        entries
            .into_iter()
            .find(|e| e.kind == FileType::Directory && parse_object_id(&e.name) == Some(id))
            .map(|e| ns.join(&e.name))
    }

    /// Fetch one batch of events after `cursor` and apply it. Returns the
    /// cursor for the next call.
    pub async fn poll_once(&self, cursor: i64) -> Result<i64, PollerError> {
        let batch = self.hub.get_state_events(cursor).await?;
        let ns = Namespace::QuickApps.path();

        let mut changed = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let mut resync = false;

        for raw in &batch.events {
            match raw.event() {
                RemoteEvent::FilesChanged { id } => {
                    tracing::debug!(id, "quickapp files changed");
                    if let Some(dir) = self.known_dir(id).await {
                        changed.insert(dir);
                    }
                    resync = true;
                }
                RemoteEvent::DeviceCreated { id } => {
                    tracing::debug!(id, "device created");
                    resync = true;
                }
                RemoteEvent::DeviceRemoved { id } => {
                    tracing::debug!(id, "device removed");
                    if let Some(dir) = self.known_dir(id).await {
                        removed.insert(dir);
                    }
                    resync = true;
                }
                RemoteEvent::Other { kind } => {
                    tracing::trace!(kind = %kind, "ignored state event");
                }
            }
        }

        if resync {
            self.engine.resync(Namespace::QuickApps).await?;
            for dir in changed.difference(&removed) {
                self.notifier.fire(FileChangeEvent::changed(dir.clone()));
            }
            for dir in removed {
                self.notifier.fire(FileChangeEvent::deleted(dir));
            }
            self.notifier.fire(FileChangeEvent::changed(ns));
        }

        Ok(batch.last)
    }

    /// Poll until cancelled, or until `max_errors` consecutive failures.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), PollerError> {
        let mut cursor = 0;
        let mut errors = 0u32;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = self.poll_once(cursor) => match result {
                    Ok(next) => {
                        cursor = next;
                        errors = 0;
                    }
                    Err(e) => {
                        errors += 1;
                        tracing::warn!(error = %e, errors, "state poll failed");
                        if errors >= self.max_errors {
                            tracing::error!(errors, "state poller giving up");
                            return Err(PollerError::TooManyRetries(errors));
                        }
                    }
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    pub fn spawn(self: &Arc<Self>) -> PollerHandle {
        let cancel = CancellationToken::new();
        PollerHandle::spawn("state", cancel.clone(), self.clone().run(cancel))
    }
}
