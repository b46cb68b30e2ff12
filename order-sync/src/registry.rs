//! Handler registry keyed by `(event, source_id)`

use std::fmt;
use std::sync::Arc;

use shared::Order;

use crate::router::EventKind;

/// Callback invoked with each routed order
pub type OrderHandler = Arc<dyn Fn(&Order) + Send + Sync>;

struct Registration {
    event: EventKind,
    source_id: String,
    handler: OrderHandler,
}

/// Registered handlers in registration order
///
/// At most one handler exists per `(event, source_id)`; registering again
/// under the same pair replaces the callback and keeps its position.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an existing registration was replaced
    pub fn register(
        &mut self,
        event: EventKind,
        source_id: impl Into<String>,
        handler: OrderHandler,
    ) -> bool {
        let source_id = source_id.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.event == event && e.source_id == source_id)
        {
            entry.handler = handler;
            return true;
        }
        self.entries.push(Registration {
            event,
            source_id,
            handler,
        });
        false
    }

    pub fn unregister(&mut self, event: EventKind, source_id: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.event == event && e.source_id == source_id));
        self.entries.len() != before
    }

    /// Remove every registration of `source_id`, returning how many were removed
    pub fn unregister_source(&mut self, source_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.source_id != source_id);
        before - self.entries.len()
    }

    /// Handlers for `event`, in registration order
    pub fn handlers(&self, event: EventKind) -> Vec<OrderHandler> {
        self.entries
            .iter()
            .filter(|e| e.event == event)
            .map(|e| e.handler.clone())
            .collect()
    }

    pub fn contains(&self, event: EventKind, source_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.event == event && e.source_id == source_id)
    }

    pub fn count(&self, event: EventKind) -> usize {
        self.entries.iter().filter(|e| e.event == event).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.event, e.source_id.as_str())))
            .finish()
    }
}
