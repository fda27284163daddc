//! Delivery backends.
//!
//! Every delivery target implements [`Backend`]. Workers hand each backend the
//! events of one task; the backend attempts every event independently and
//! reports failures as values, so a misbehaving target can never take a worker
//! down.
//!
//! ```text
//! DispatchTask → BackendRegistry (ordered) → LogBackend, SlackBackend, ...
//! ```

pub mod log;
pub mod registry;
pub mod slack;

use futures::future::BoxFuture;

use crate::error::DeliveryError;
use crate::event::Event;

pub use self::log::{LogBackend, LogFile};
pub use registry::{BackendKind, BackendRegistry};
pub use slack::{SlackBackend, SlackConfig};

/// A delivery target for security events.
pub trait Backend: Send + Sync {
    /// Stable identifier of the backend kind (e.g. `"log"`), for diagnostics.
    fn name(&self) -> &str;

    /// Attempt delivery of every event.
    ///
    /// Returns one [`DeliveryError`] per event that could not be delivered.
    /// A failure on one event must not stop the remaining ones.
    fn dispatch<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, Vec<DeliveryError>>;

    /// Release owned resources. Idempotent.
    fn close(&self) -> BoxFuture<'_, ()>;
}
