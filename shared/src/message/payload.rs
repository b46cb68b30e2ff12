use crate::models::Order;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `SyncPayload::resource` value for order pushes
pub const ORDER_RESOURCE: &str = "order";

// ==================== Payloads ====================

/// Handshake payload (client -> server)
///
/// Carries the protocol version for server-side validation and the
/// restaurant whose order stream the client subscribes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Protocol version
    pub version: u16,
    /// Client name
    pub client_name: Option<String>,
    /// Client version
    pub client_version: Option<String>,
    /// Client identifier (UUID)
    pub client_id: Option<String>,
    /// Restaurant (tenant) to subscribe to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Change kind of a pushed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Created => write!(f, "created"),
            SyncAction::Updated => write!(f, "updated"),
            SyncAction::Deleted => write!(f, "deleted"),
        }
    }
}

/// Sync signal (server -> all clients of a tenant)
///
/// Broadcast whenever a resource changes, whichever client triggered it.
///
/// # Example
/// - `resource`: "order"
/// - `version`: 42
/// - `action`: "updated"
/// - `id`: "9981"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    /// Resource type ("order", ...)
    pub resource: String,
    /// Server-side change counter, informational only
    pub version: u64,
    /// Change kind
    pub action: SyncAction,
    /// Resource ID
    pub id: String,
    /// Full resource (absent for deletions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SyncPayload {
    /// Order push carrying the full record
    pub fn order(action: SyncAction, order: &Order, version: u64) -> Self {
        Self {
            resource: ORDER_RESOURCE.to_string(),
            version,
            action,
            id: order.id.clone(),
            data: serde_json::to_value(order).ok(),
        }
    }
}

/// Generic response payload (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Whether the request succeeded
    pub success: bool,
    /// Response or error message
    pub message: String,
    /// Response data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error code (failures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

// ==================== Convenience Constructors ====================

impl ResponsePayload {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error_code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: code,
        }
    }
}
