//! Error types.
//!
//! Two families with different propagation rules:
//! - [`ConfigError`]: startup faults (bad backend set, pool misuse). Returned as
//!   `Err` and treated as fatal by the binary.
//! - [`DeliveryError`]: a single backend failing a single event. Returned as a
//!   plain value from `Backend::dispatch` and only ever logged.

use std::fmt;

use thiserror::Error;

/// Startup / wiring errors. None of these can happen once the pool is running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A backend instance does not satisfy the backend contract.
    #[error("invalid backend at position {index}: {reason}")]
    InvalidBackend { index: usize, reason: String },

    /// A configured backend kind has no implementation.
    #[error("unknown backend kind: {0}")]
    UnknownBackend(String),

    /// A setting required by an enabled backend is absent.
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),

    /// A setting is present but unusable.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// `WorkerPool::start` was called more than once.
    #[error("dispatch worker pool already started")]
    PoolAlreadyStarted,
}

/// Why one backend failed to deliver one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DeliveryError {}
