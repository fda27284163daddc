//! Dispatch queue between ingestion and the worker pool.
//!
//! ```text
//! Web Server → DispatchQueue → WorkerPool → BackendRegistry
//! ```

pub mod dispatch;
pub mod types;

pub use dispatch::{DispatchQueue, QueueError};
pub use types::DispatchTask;
