//! Batched change notifications for the host.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::path::VirtualPath;

/// Default coalescing window.
pub const DEBOUNCE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeType {
    Created,
    Changed,
    Deleted,
}

/// One change, keyed by canonical virtual path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: FileChangeType,
    pub path: VirtualPath,
}

impl FileChangeEvent {
    pub fn created(path: VirtualPath) -> Self {
        Self {
            kind: FileChangeType::Created,
            path,
        }
    }

    pub fn changed(path: VirtualPath) -> Self {
        Self {
            kind: FileChangeType::Changed,
            path,
        }
    }

    pub fn deleted(path: VirtualPath) -> Self {
        Self {
            kind: FileChangeType::Deleted,
            path,
        }
    }
}

/// Collects fired events and publishes them in batches.
///
/// A batch is flushed once no new event has arrived for the debounce window.
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: mpsc::UnboundedSender<FileChangeEvent>,
    out: broadcast::Sender<Vec<FileChangeEvent>>,
    cancel: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ChangeNotifier {
    /// Start the batching task. Must be called inside a tokio runtime.
    pub fn spawn(window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out, _) = broadcast::channel(256);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Self::run(rx, out.clone(), window, cancel.clone()));

        Self {
            tx,
            out,
            cancel,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    pub fn fire(&self, event: FileChangeEvent) {
        tracing::trace!(path = %event.path, kind = ?event.kind, "change fired");
        // Closed only after shutdown; late events are dropped.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<FileChangeEvent>> {
        self.out.subscribe()
    }

    /// Stop the batching task, flushing nothing further.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "change notifier task failed");
            }
        }
    }

    async fn run(
        mut rx: mpsc::UnboundedReceiver<FileChangeEvent>,
        out: broadcast::Sender<Vec<FileChangeEvent>>,
        window: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            let first = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let mut batch = vec![first];
            let mut deadline = Instant::now() + window;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => break,
                    event = rx.recv() => match event {
                        Some(event) => {
                            batch.push(event);
                            deadline = Instant::now() + window;
                        }
                        None => break,
                    },
                }
            }

            tracing::debug!(events = batch.len(), "publishing file changes");
            // No subscribers is fine.
            let _ = out.send(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_burst_is_one_batch() {
        let notifier = ChangeNotifier::spawn(Duration::from_millis(20));
        let mut rx = notifier.subscribe();

        notifier.fire(FileChangeEvent::created(vp("/QuickApps/1_A/new.lua")));
        notifier.fire(FileChangeEvent::changed(vp("/QuickApps/1_A")));

        let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, FileChangeType::Created);
        assert_eq!(batch[1].path, vp("/QuickApps/1_A"));

        notifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_separate_bursts() {
        let notifier = ChangeNotifier::spawn(DEBOUNCE);
        let mut rx = notifier.subscribe();

        notifier.fire(FileChangeEvent::deleted(vp("/QuickApps/12_Lamp")));
        let first = rx.recv().await.unwrap();
        assert_eq!(first, vec![FileChangeEvent::deleted(vp("/QuickApps/12_Lamp"))]);

        notifier.fire(FileChangeEvent::changed(vp("/Scenes")));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.len(), 1);

        notifier.shutdown().await;
        notifier.fire(FileChangeEvent::changed(vp("/Scenes")));
    }
}
