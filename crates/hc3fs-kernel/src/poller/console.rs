//! Debug console poller.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{PollerError, PollerHandle};
use crate::hub::{HubApi, HubError};

/// Tracing target console lines are emitted on.
pub const CONSOLE_TARGET: &str = "hc3::console";

/// Only QuickApp output is relevant.
const RELEVANT_TAG_PREFIX: &str = "QUICKAPP";
/// UI refresh chatter every QuickApp emits.
const NOISE: &str = "PluginChangedViewEvent";

/// One line of hub console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleMessage {
    /// Hub timestamp, seconds.
    pub time: i64,
    pub level: String,
    pub tag: String,
    pub message: String,
}

impl ConsoleMessage {
    /// Local wall-clock time of the message.
    pub fn local_time(&self) -> String {
        chrono::DateTime::from_timestamp(self.time, 0)
            .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct LogState {
    watermark: i64,
    enabled: bool,
    tags: BTreeMap<String, bool>,
}

/// Polls `/debugMessages` and forwards the lines the user opted into.
///
/// Tags are learned as they appear and start hidden; [`enable_tags`]
/// is the picker's write side.
///
/// [`enable_tags`]: LogPoller::enable_tags
pub struct LogPoller {
    hub: Arc<dyn HubApi>,
    interval: Duration,
    state: Mutex<LogState>,
    tx: mpsc::UnboundedSender<ConsoleMessage>,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn unescape(message: &str) -> String {
    message.replace("&nbsp;", " ").replace("<br>", "\n")
}

impl LogPoller {
    /// Create a poller and the receiving end of its console channel.
    pub fn new(
        hub: Arc<dyn HubApi>,
        interval: Duration,
        enabled: bool,
    ) -> (Self, mpsc::UnboundedReceiver<ConsoleMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = Self {
            hub,
            interval,
            state: Mutex::new(LogState {
                watermark: now_secs(),
                enabled,
                tags: BTreeMap::new(),
            }),
            tx,
        };
        (poller, rx)
    }

    /// Start reading from `since` instead of "now".
    pub fn with_watermark(self, since: i64) -> Self {
        self.state.lock().watermark = since;
        self
    }

    pub fn watermark(&self) -> i64 {
        self.state.lock().watermark
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Flip polling on or off. Either way, only messages from now on are
    /// shown. Returns the new state.
    pub fn toggle(&self) -> bool {
        let mut state = self.state.lock();
        state.watermark = now_secs();
        state.enabled = !state.enabled;
        tracing::info!(enabled = state.enabled, "console logging toggled");
        state.enabled
    }

    /// Known tags and whether each is shown.
    pub fn tags(&self) -> Vec<(String, bool)> {
        self.state
            .lock()
            .tags
            .iter()
            .map(|(tag, on)| (tag.clone(), *on))
            .collect()
    }

    /// Show exactly `enabled`; every other known tag is hidden.
    pub fn enable_tags<I, S>(&self, enabled: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock();
        for on in state.tags.values_mut() {
            *on = false;
        }
        for tag in enabled {
            let tag = tag.into();
            tracing::debug!(tag = %tag, "console tag enabled");
            state.tags.insert(tag, true);
        }
    }

    /// Fetch and forward one batch. Returns the number of lines emitted.
    pub async fn poll_once(&self) -> Result<usize, HubError> {
        let since = {
            let state = self.state.lock();
            if !state.enabled {
                return Ok(0);
            }
            state.watermark
        };

        let batch = self.hub.get_debug_messages(since).await?;
        let mut emitted = 0;

        // Newest first on the wire; replay oldest first.
        for m in batch.messages.iter().rev() {
            let message = unescape(&m.message);
            let shown = {
                let mut state = self.state.lock();
                state.watermark = m.timestamp;
                *state.tags.entry(m.tag.clone()).or_insert(false)
            };
            if !shown || !m.tag.starts_with(RELEVANT_TAG_PREFIX) || message.contains(NOISE) {
                continue;
            }

            tracing::info!(
                target: "hc3::console",
                tag = %m.tag,
                level = %m.level,
                "{message}"
            );
            let line = ConsoleMessage {
                time: m.timestamp,
                level: m.level.clone(),
                tag: m.tag.clone(),
                message,
            };
            // Nobody listening is fine; tracing still has the line.
            let _ = self.tx.send(line);
            emitted += 1;
        }

        if let Some(ts) = batch.timestamp {
            self.state.lock().watermark = ts;
        }
        Ok(emitted)
    }

    /// Poll until cancelled. Failures are logged and retried forever.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), PollerError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = self.poll_once() => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "debug message fetch failed");
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
        PollerHandle::spawn("console", cancel.clone(), self.clone().run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHub;

    fn poller(hub: &Arc<MockHub>) -> (LogPoller, mpsc::UnboundedReceiver<ConsoleMessage>) {
        let (poller, rx) = LogPoller::new(hub.clone(), Duration::from_millis(10), true);
        (poller.with_watermark(0), rx)
    }

    #[tokio::test]
    async fn test_unknown_tags_start_hidden() {
        let hub = Arc::new(MockHub::new());
        hub.push_debug_message(10, "QUICKAPP12", "debug", "hello");
        let (poller, mut rx) = poller(&hub);

        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert_eq!(poller.tags(), vec![("QUICKAPP12".to_string(), false)]);
        assert_eq!(poller.watermark(), 10);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_filters_and_rewrites() {
        let hub = Arc::new(MockHub::new());
        hub.push_debug_message(1, "QUICKAPP12", "debug", "a&nbsp;b<br>c");
        hub.push_debug_message(2, "QUICKAPP12", "trace", "PluginChangedViewEvent x");
        hub.push_debug_message(3, "SYSTEM", "debug", "boot");
        hub.push_debug_message(4, "QUICKAPP12", "error", "later");
        let (poller, mut rx) = poller(&hub);
        poller.enable_tags(["QUICKAPP12", "SYSTEM"]);

        assert_eq!(poller.poll_once().await.unwrap(), 2);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.message, "a b\nc");
        assert_eq!(first.time, 1);
        assert_eq!(rx.recv().await.unwrap().message, "later");
        assert_eq!(poller.watermark(), 4);

        // Nothing newer than the watermark.
        assert_eq!(poller.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_toggle_stops_polling() {
        let hub = Arc::new(MockHub::new());
        let (poller, _rx) = poller(&hub);

        assert!(!poller.toggle());
        assert!(poller.watermark() > 0);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert_eq!(hub.count("get_debug_messages"), 0);
        assert!(poller.toggle());
    }

    #[tokio::test]
    async fn test_enable_tags_replaces_selection() {
        let hub = Arc::new(MockHub::new());
        let (poller, _rx) = poller(&hub);
        poller.enable_tags(["QUICKAPP1", "QUICKAPP2"]);
        poller.enable_tags(["QUICKAPP2"]);
        assert_eq!(
            poller.tags(),
            vec![
                ("QUICKAPP1".to_string(), false),
                ("QUICKAPP2".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_run_survives_errors_and_cancels() {
        let hub = Arc::new(MockHub::new());
        hub.fail_next("get_debug_messages", 503);
        let (poller, _rx) = poller(&hub);
        let handle = Arc::new(poller).spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert!(hub.count("get_debug_messages") >= 2);
        handle.shutdown().await.unwrap();
    }
}
