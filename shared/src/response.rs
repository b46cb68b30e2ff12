//! API Response types
//!
//! Envelope used by the order backend for error bodies (and, on some
//! deployments, for successful responses as well).

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};

/// Unified API response structure
///
/// ```json
/// {
///     "code": 4001,
///     "message": "Order not found",
///     "data": null
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Response code (0 = success, others = error codes)
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Response data (optional)
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn ok(data: T) -> Self {
        Self {
            code: ErrorCode::Success,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Whether the response carries a success code
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}
