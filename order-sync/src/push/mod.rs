//! Push channel: live order events from the message bus

pub mod client;
pub mod transport;

pub use client::{Connector, MessagePushChannel};

use async_trait::async_trait;
use shared::Order;
use shared::message::{BusMessage, EventType, ORDER_RESOURCE, SyncPayload};
use tokio::sync::broadcast;

use crate::error::PushError;
use crate::router::EventKind;

/// Live event source for one tenant
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open the channel for `tenant_id`, replacing any previous connection
    async fn connect(&self, tenant_id: &str) -> Result<(), PushError>;

    fn is_connected(&self) -> bool;

    /// Receive every frame from now on; dropping the receiver unsubscribes
    fn subscribe(&self) -> broadcast::Receiver<BusMessage>;

    /// Close the channel. Safe to call when not connected.
    fn disconnect(&self);
}

/// A decoded order event
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub kind: EventKind,
    pub order: Order,
}

impl PushEvent {
    pub fn new(kind: EventKind, order: Order) -> Self {
        Self { kind, order }
    }

    /// Decode an order event from a bus frame
    ///
    /// Returns `None` for other event types, other resources, deletions and
    /// malformed payloads.
    pub fn from_bus_message(msg: &BusMessage) -> Option<Self> {
        if msg.event_type != EventType::Sync {
            return None;
        }

        let payload = match msg.parse_payload::<SyncPayload>() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed sync payload");
                return None;
            }
        };
        if payload.resource != ORDER_RESOURCE {
            return None;
        }

        let kind = EventKind::from_action(payload.action)?;
        let data = payload.data?;
        match serde_json::from_value::<Order>(data) {
            Ok(order) => Some(Self::new(kind, order)),
            Err(e) => {
                tracing::debug!(order_id = %payload.id, error = %e, "Ignoring undecodable order push");
                None
            }
        }
    }

    /// Encode as a bus frame
    pub fn to_bus_message(&self, version: u64) -> BusMessage {
        let action = match self.kind {
            EventKind::OrderCreated => shared::message::SyncAction::Created,
            EventKind::OrderUpdated => shared::message::SyncAction::Updated,
        };
        BusMessage::sync(&SyncPayload::order(action, &self.order, version))
    }
}
