//! Client configuration, read from flags with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::session::DEFAULT_EXPIRY_SKEW;

/// API base used when no flag or environment variable names one.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/";

/// Dashboard-era names read when the `GREGOR_*` variables are unset.
pub const LEGACY_API_ENV: &str = "REACT_APP_APIDB";
pub const LEGACY_AUTH_ENV: &str = "REACT_APP_USERDB";

/// Remember-me file used when `GREGOR_SESSION_FILE` is not set.
pub const DEFAULT_SESSION_FILE: &str = ".gregor-session.json";

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Connection and session settings shared by every command.
#[derive(Debug, Clone, Args)]
pub struct ClientConfig {
    /// Base URL of the metadata API.
    #[arg(long = "api-url", env = "GREGOR_APIDB", global = true)]
    pub api_url: Option<String>,

    /// Base URL of the auth endpoints. Defaults to the API base.
    #[arg(long = "auth-url", env = "GREGOR_USERDB", global = true)]
    pub auth_url: Option<String>,

    /// Path of the JSON schema document (one schema per table).
    #[arg(long, env = "GREGOR_SCHEMAS", global = true)]
    pub schemas: Option<PathBuf>,

    /// Where remembered credentials are stored.
    #[arg(long, env = "GREGOR_SESSION_FILE", default_value = DEFAULT_SESSION_FILE, global = true)]
    pub session_file: PathBuf,

    /// Per-request timeout in seconds. Unset waits indefinitely.
    #[arg(long = "timeout-secs", env = "GREGOR_REQUEST_TIMEOUT_SECS", global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Seconds before token expiry at which the session is dropped.
    #[arg(long = "expiry-skew-secs", default_value_t = DEFAULT_EXPIRY_SKEW.as_secs(), global = true)]
    pub expiry_skew_secs: u64,

    /// Log output format; filtering follows `RUST_LOG`.
    #[arg(long = "log-format", env = "GREGOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            auth_url: None,
            schemas: None,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            request_timeout_secs: None,
            expiry_skew_secs: DEFAULT_EXPIRY_SKEW.as_secs(),
            log_format: LogFormat::Text,
        }
    }
}

impl ClientConfig {
    /// API base URL, or [`DEFAULT_API_URL`].
    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Auth base URL, falling back to the API base.
    #[must_use]
    pub fn auth_base(&self) -> &str {
        self.auth_url.as_deref().unwrap_or_else(|| self.api_base())
    }

    /// Fills unset base URLs from [`LEGACY_API_ENV`] and [`LEGACY_AUTH_ENV`].
    /// Empty values are ignored.
    pub fn fill_from_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if self.api_url.is_none() {
            self.api_url = read(LEGACY_API_ENV);
        }
        if self.auth_url.is_none() {
            self.auth_url = read(LEGACY_AUTH_ENV);
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn expiry_skew(&self) -> Duration {
        Duration::from_secs(self.expiry_skew_secs)
    }
}
