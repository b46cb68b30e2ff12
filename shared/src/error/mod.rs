//! Error codes shared between the order backend and its clients
//!
//! - [`ErrorCode`]: standardized numeric codes carried in API responses
//! - HTTP status mapping in both directions, used when a response body
//!   carries no code
//!
//! # Example
//!
//! ```
//! use shared::error::ErrorCode;
//!
//! let code = ErrorCode::try_from(4001).unwrap();
//! assert_eq!(code, ErrorCode::OrderNotFound);
//! assert_eq!(code.http_status(), http::StatusCode::NOT_FOUND);
//! ```

mod codes;
mod http;

pub use codes::{ErrorCode, InvalidErrorCode};
