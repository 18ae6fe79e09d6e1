//! Background loops that watch the hub.
//!
//! Each poller runs as a task owned by a [`PollerHandle`], stopped through
//! its cancellation token. Pollers log their own failures; nothing they do
//! surfaces as a filesystem error.

mod console;
mod state;

use std::future::Future;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::hub::HubError;
use crate::vfs::VfsError;

pub use console::{ConsoleMessage, LogPoller, CONSOLE_TARGET};
pub use state::StatePoller;

#[derive(Debug, Error)]
pub enum PollerError {
    /// The state poller used up its error budget.
    #[error("gave up after {0} consecutive errors")]
    TooManyRetries(u32),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("poller task failed: {0}")]
    Task(String),
}

/// A running poller.
pub struct PollerHandle {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), PollerError>>,
}

impl PollerHandle {
    /// Spawn `work`, which must return once `cancel` fires.
    pub fn spawn<F>(name: &'static str, cancel: CancellationToken, work: F) -> Self
    where
        F: Future<Output = Result<(), PollerError>> + Send + 'static,
    {
        tracing::debug!(poller = name, "poller started");
        Self {
            name,
            cancel,
            task: tokio::spawn(work),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end on its own.
    pub async fn join(self) -> Result<(), PollerError> {
        self.task
            .await
            .map_err(|e| PollerError::Task(e.to_string()))?
    }

    /// Cancel and wait.
    pub async fn shutdown(self) -> Result<(), PollerError> {
        self.cancel.cancel();
        let name = self.name;
        let result = self.join().await;
        tracing::debug!(poller = name, "poller stopped");
        result
    }
}
