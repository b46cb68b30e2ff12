//! Domain models

pub mod order;
pub mod session;

pub use order::{Order, OrderDraft, OrderItem, OrderOrigin, OrderPatch, OrderStatus};
pub use session::{Role, Session, UserInfo};
