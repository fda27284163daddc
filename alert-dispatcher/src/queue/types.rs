//! Queue message types.

use std::sync::Arc;

use crate::backend::BackendRegistry;
use crate::event::Event;

/// One accepted webhook call waiting for delivery.
///
/// Pairs the events of the call with the registry of backends that must
/// attempt them. Immutable; dropped once every backend has been tried.
#[derive(Debug, Clone)]
pub struct DispatchTask {
    registry: Arc<BackendRegistry>,
    events: Vec<Event>,
}

impl DispatchTask {
    /// Create a new dispatch task.
    pub fn new(registry: Arc<BackendRegistry>, events: Vec<Event>) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
