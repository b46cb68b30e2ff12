//! Event router
//!
//! Delivers order events to registered handlers. Creation events pass an
//! access filter for the restricted staff role; update events are delivered
//! unconditionally and left to consumers to filter.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use shared::message::SyncAction;
use shared::{Order, OrderOrigin, Session};

use crate::push::PushEvent;
use crate::registry::{HandlerRegistry, OrderHandler};

/// Order event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderCreated,
    OrderUpdated,
}

impl EventKind {
    /// Event name used by the push server
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => "new_order",
            EventKind::OrderUpdated => "order_updated",
        }
    }

    pub fn from_action(action: SyncAction) -> Option<Self> {
        match action {
            SyncAction::Created => Some(EventKind::OrderCreated),
            SyncAction::Updated => Some(EventKind::OrderUpdated),
            SyncAction::Deleted => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routes order events of one session to its handlers
pub struct EventRouter {
    session: Session,
    registry: Mutex<HandlerRegistry>,
}

impl EventRouter {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            registry: Mutex::new(HandlerRegistry::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn registry(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` under `(event, source_id)`, replacing any previous one
    pub fn register<F>(&self, event: EventKind, source_id: impl Into<String>, handler: F)
    where
        F: Fn(&Order) + Send + Sync + 'static,
    {
        let source_id = source_id.into();
        let replaced = self
            .registry()
            .register(event, source_id.clone(), std::sync::Arc::new(handler));
        tracing::debug!(event = %event, source_id = %source_id, replaced, "Handler registered");
    }

    pub fn unregister(&self, event: EventKind, source_id: &str) -> bool {
        self.registry().unregister(event, source_id)
    }

    pub fn unregister_source(&self, source_id: &str) -> usize {
        let removed = self.registry().unregister_source(source_id);
        if removed > 0 {
            tracing::debug!(source_id = %source_id, removed, "Handlers unregistered");
        }
        removed
    }

    pub fn is_registered(&self, event: EventKind, source_id: &str) -> bool {
        self.registry().contains(event, source_id)
    }

    pub fn handler_count(&self) -> usize {
        self.registry().len()
    }

    /// Whether the session may observe `order` for `event`
    ///
    /// Staff only see creation events for orders they entered themselves
    /// through the staff channel. Updates are never filtered.
    pub fn is_visible(&self, event: EventKind, order: &Order) -> bool {
        if event != EventKind::OrderCreated || !self.session.role.is_restricted() {
            return true;
        }
        order.origin == OrderOrigin::Staff
            && order.created_by.as_deref() == Some(self.session.user_id.as_str())
    }

    /// Invoke every handler for `event` in registration order
    ///
    /// The handler list is copied first, so handlers may register,
    /// unregister or stop the owning context. Returns the number invoked.
    pub fn dispatch(&self, event: EventKind, order: &Order) -> usize {
        if !self.is_visible(event, order) {
            tracing::debug!(event = %event, order_id = %order.id, "Event filtered for restricted role");
            return 0;
        }

        let handlers: Vec<OrderHandler> = self.registry().handlers(event);
        for handler in &handlers {
            handler(order);
        }
        handlers.len()
    }

    pub fn route(&self, event: &PushEvent) -> usize {
        self.dispatch(event.kind, &event.order)
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("session", &self.session)
            .field("registry", &*self.registry())
            .finish()
    }
}
