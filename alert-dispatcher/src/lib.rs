//! Sqreen security alert dispatcher.
//!
//! Receives signed security-alert webhooks and fans every accepted call out
//! to the configured delivery backends (log file, Slack) from a pool of
//! background workers, so the webhook is acknowledged before delivery runs.
//!
//! ## Architecture
//!
//! ```text
//! Webhook → signature check → DispatchQueue → WorkerPool → BackendRegistry → backends
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod web;
pub mod worker;

// Re-export commonly used types
pub use backend::{Backend, BackendRegistry, LogBackend, SlackBackend};
pub use config::Config;
pub use error::{ConfigError, DeliveryError};
pub use event::Event;
pub use queue::{DispatchQueue, DispatchTask, QueueError};
pub use web::AppState;
pub use worker::WorkerPool;
