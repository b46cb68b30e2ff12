//! Shared types for the order sync workspace
//!
//! Domain and wire types used by the sync engine and any consumer of it:
//! the order model, list queries and pages, sessions, message bus frames,
//! the API response envelope and error codes.

pub mod error;
pub mod message;
pub mod models;
pub mod query;
pub mod response;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{BusMessage, EventType};

pub use error::ErrorCode;
pub use models::{
    Order, OrderDraft, OrderItem, OrderOrigin, OrderPatch, OrderStatus, Role, Session, UserInfo,
};
pub use query::{OrderPage, OrderQuery, SortDirection, StatusFilter, total_pages_for};
pub use response::ApiResponse;
