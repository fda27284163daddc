//! Ordered, immutable set of active backends.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use super::{Backend, LogBackend, SlackBackend, SlackConfig};
use crate::config::Config;
use crate::error::ConfigError;

/// Backend kinds that can be enabled from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Log,
    Slack,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log" => Ok(BackendKind::Log),
            "slack" => Ok(BackendKind::Slack),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Backends every dispatch task is delivered to, in registration order.
///
/// Built once at startup and shared read-only by all workers.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Register `backends` in the given order.
    ///
    /// A backend without a usable name cannot be identified in diagnostics
    /// and is rejected.
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Result<Self, ConfigError> {
        for (index, backend) in backends.iter().enumerate() {
            if backend.name().trim().is_empty() {
                return Err(ConfigError::InvalidBackend {
                    index,
                    reason: "backend name is empty".to_string(),
                });
            }
        }

        if backends.is_empty() {
            warn!("backend_registry_empty");
        }

        Ok(Self { backends })
    }

    /// Build the backends named in `config.backends`.
    pub async fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut backends: Vec<Arc<dyn Backend>> = Vec::with_capacity(config.backends.len());
        let mut kinds: Vec<BackendKind> = Vec::with_capacity(config.backends.len());

        for name in &config.backends {
            let kind = name.parse::<BackendKind>()?;
            // Each kind may appear once.
            if kinds.contains(&kind) {
                return Err(ConfigError::InvalidSetting {
                    name: "DISPATCH_BACKENDS",
                    reason: format!("backend {} listed more than once", name.trim()),
                });
            }
            kinds.push(kind);

            let backend: Arc<dyn Backend> = match kind {
                BackendKind::Log => {
                    let backend = LogBackend::open(&config.log_backend_path)
                        .await
                        .map_err(|e| ConfigError::InvalidSetting {
                            name: "LOG_BACKEND_PATH",
                            reason: format!("{}: {}", config.log_backend_path, e),
                        })?;
                    Arc::new(backend)
                }
                BackendKind::Slack => {
                    let token = config
                        .slack_api_token
                        .clone()
                        .ok_or(ConfigError::MissingSetting("SLACK_API_TOKEN"))?;

                    let slack_config = SlackConfig {
                        api_token: token,
                        channel: config.slack_channel.clone(),
                        api_url: config.slack_api_url.clone(),
                        request_timeout: config.slack_request_timeout(),
                    };
                    Arc::new(SlackBackend::new(slack_config)?)
                }
            };
            backends.push(backend);
        }

        let registry = Self::new(backends)?;
        info!(backends = ?registry.names(), "backend_registry_built");
        Ok(registry)
    }

    /// Backends in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Close every backend once.
    pub async fn close_all(&self) {
        for backend in &self.backends {
            backend.close().await;
            info!(backend = backend.name(), "backend_closed");
        }
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
