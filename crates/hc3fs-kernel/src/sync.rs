//! Readiness gate and the path-resolution lock.

use std::future::Future;
use tokio::sync::{watch, Mutex};

/// Binary latch that holds filesystem operations until the session is ready.
///
/// `open()` releases every current and future waiter; `close()` re-arms it,
/// so a session can be torn down and brought up again.
#[derive(Debug)]
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    /// A closed gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn close(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the gate is open. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-slot exclusion around a unit of async work.
///
/// Waiters are served in arrival order.
#[derive(Debug, Default)]
pub struct Lock {
    inner: Mutex<()>,
}

impl Lock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` with the lock held. The lock is released when `work`
    /// completes, whether it succeeded or not.
    pub async fn acquire<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.inner.lock().await;
        work.await
    }

    /// True while some caller is inside `acquire`.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_gate_releases_all_waiters() {
        let gate = Arc::new(Gate::new());
        assert!(!gate.is_open());

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            waiters.push(tokio::spawn(async move { gate.wait().await }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        gate.open();
        for w in waiters {
            tokio::time::timeout(Duration::from_secs(1), w)
                .await
                .unwrap()
                .unwrap();
        }

        // Open gate passes straight through.
        gate.wait().await;

        gate.close();
        assert!(!gate.is_open());
    }

    #[tokio::test]
    async fn test_lock_never_overlaps() {
        let lock = Arc::new(Lock::new());
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for i in 0..4 {
            let lock = lock.clone();
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                lock.acquire(async {
                    log.lock().push(format!("begin {i}"));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    log.lock().push(format!("end {i}"));
                })
                .await
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let log = log.lock();
        assert_eq!(log.len(), 8);
        for pair in log.chunks(2) {
            let begin = pair[0].strip_prefix("begin ").unwrap();
            let end = pair[1].strip_prefix("end ").unwrap();
            assert_eq!(begin, end);
        }
    }

    #[tokio::test]
    async fn test_lock_released_on_error() {
        let lock = Lock::new();
        let r: Result<(), &str> = lock.acquire(async { Err("boom") }).await;
        assert!(r.is_err());
        assert!(!lock.is_held());
        assert_eq!(lock.acquire(async { 7 }).await, 7);
    }
}
