//! Session configuration.
//!
//! Loaded from `config.toml` under the user config directory (or an explicit
//! path), then overridden by `HC3_URL`, `HC3_USER` and `HC3_PASSWORD`.
//!
//! ```toml
//! [hub]
//! url = "http://192.168.1.57/"
//! user = "admin"
//! password = "secret"
//!
//! [log]
//! enabled = true
//! tags = ["QUICKAPP1001"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Where and how to reach the hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of the hub, e.g. `http://192.168.1.57/`.
    pub url: String,
    pub user: String,
    pub password: String,
}

impl HubConfig {
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Root of the REST API.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.url.trim_end_matches('/'))
    }
}

/// Debug console poller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Start with console polling on.
    pub enabled: bool,
    pub interval_ms: u64,
    /// Tags shown from the start; every other tag starts hidden.
    pub tags: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            tags: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// State event poller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Consecutive failures before the poller gives up.
    pub max_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_errors: 1000,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hc3Config {
    pub hub: HubConfig,
    pub log: LogConfig,
    pub poll: PollConfig,
    /// If set, the shadow root path is written here once the session is up,
    /// for tools that run QuickApps from the local mirror.
    pub path_file: Option<PathBuf>,
}

impl Hc3Config {
    pub fn new(hub: HubConfig) -> Self {
        Self {
            hub,
            ..Self::default()
        }
    }

    pub fn with_path_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path_file = Some(path.into());
        self
    }

    /// `~/.config/hc3fs/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hc3fs").join("config.toml"))
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`, or from the default location if `None`. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Apply overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `HC3_URL` / `HC3_USER` / `HC3_PASSWORD` from `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("HC3_URL") {
            self.hub.url = url;
        }
        if let Some(user) = lookup("HC3_USER") {
            self.hub.user = user;
        }
        if let Some(password) = lookup("HC3_PASSWORD") {
            self.hub.password = password;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.hub.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid(
                "hub.url is not set (config file or HC3_URL)".into(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "hub.url must be an http(s) URL, got {url}"
            )));
        }
        if self.hub.user.is_empty() {
            return Err(ConfigError::Invalid(
                "hub.user is not set (config file or HC3_USER)".into(),
            ));
        }
        if self.poll.max_errors == 0 {
            return Err(ConfigError::Invalid("poll.max_errors must be at least 1".into()));
        }
        Ok(())
    }
}
