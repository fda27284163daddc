//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables, falling back to
//! defaults suitable for a single-node deployment.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::backend::log::DEFAULT_LOG_PATH;
use crate::backend::slack::{DEFAULT_CHANNEL, DEFAULT_SLACK_API_URL};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Shared secret Sqreen signs webhook bodies with
    pub webhook_secret: Option<String>,

    /// Backend kinds to enable, in dispatch order
    pub backends: Vec<String>,

    // =========================================================================
    // Log backend
    // =========================================================================

    /// File the log backend appends records to
    pub log_backend_path: String,

    // =========================================================================
    // Slack backend
    // =========================================================================

    /// Slack bot token (required when the slack backend is enabled)
    pub slack_api_token: Option<String>,

    /// Channel name, without the leading '#'
    pub slack_channel: String,

    /// Slack Web API base URL
    pub slack_api_url: String,

    /// HTTP timeout for a single Slack call, in milliseconds
    pub slack_request_timeout_ms: u64,

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Number of dispatch workers
    pub worker_count: usize,

    /// Optional bound on queued tasks; unbounded when unset
    pub dispatch_queue_capacity: Option<usize>,

    /// Seconds to wait for in-flight tasks at shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            webhook_secret: None,
            backends: vec!["log".to_string()],
            log_backend_path: DEFAULT_LOG_PATH.to_string(),
            slack_api_token: None,
            slack_channel: DEFAULT_CHANNEL.to_string(),
            slack_api_url: DEFAULT_SLACK_API_URL.to_string(),
            slack_request_timeout_ms: 10_000,
            worker_count: 1,
            dispatch_queue_capacity: None,
            shutdown_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_number("PORT").unwrap_or(defaults.port),

            webhook_secret: non_empty("SQREEN_WEBHOOK_SECRET"),

            backends: parse_csv("DISPATCH_BACKENDS").unwrap_or(defaults.backends),

            log_backend_path: non_empty("LOG_BACKEND_PATH").unwrap_or(defaults.log_backend_path),

            slack_api_token: non_empty("SLACK_API_TOKEN"),

            slack_channel: non_empty("SLACK_CHANNEL")
                .map(|c| c.trim_start_matches('#').to_string())
                .unwrap_or(defaults.slack_channel),

            slack_api_url: non_empty("SLACK_API_URL").unwrap_or(defaults.slack_api_url),

            slack_request_timeout_ms: parse_number("SLACK_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.slack_request_timeout_ms),

            worker_count: match parse_number::<usize>("WORKER_COUNT") {
                Some(0) => {
                    warn!(env_var = "WORKER_COUNT", "Worker count must be at least 1, using 1");
                    1
                }
                Some(n) => n,
                None => defaults.worker_count,
            },

            dispatch_queue_capacity: parse_number::<usize>("DISPATCH_QUEUE_CAPACITY")
                .filter(|&c| c > 0),

            shutdown_timeout_secs: parse_number("SHUTDOWN_TIMEOUT_SECS")
                .unwrap_or(defaults.shutdown_timeout_secs),
        }
    }

    pub fn slack_request_timeout(&self) -> Duration {
        Duration::from_millis(self.slack_request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a numeric variable, warning on garbage.
fn parse_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = non_empty(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid number, using default");
            None
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
