//! Order Sync - live order list synchronization
//!
//! Keeps a paginated view of a tenant's orders current. Updates arrive over
//! the message bus when it is reachable and by polling the REST API when it
//! is not. Creates and status changes are applied optimistically and rolled
//! back when the backend rejects them.

pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod push;
pub mod registry;
pub mod router;
pub mod sync;
pub mod task;
pub mod window;

pub use config::{PushConfig, SyncConfig};
pub use error::{ClientError, ClientResult, PushError, SyncError};
pub use http::{NetworkOrdersApi, OrdersApi};
pub use push::{Connector, MessagePushChannel, PushChannel, PushEvent};
pub use router::{EventKind, EventRouter};
pub use sync::{ConnectionState, MergeOutcome, MutationKind, PendingMutation, SyncContext};
pub use window::PaginationWindow;

// Re-export shared types for convenience
pub use shared::{
    Order, OrderDraft, OrderPage, OrderPatch, OrderQuery, OrderStatus, Role, Session,
    StatusFilter,
};
