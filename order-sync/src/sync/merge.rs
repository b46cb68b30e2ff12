//! Merge policy for pushed order events
//!
//! Only page 1 can absorb a new order locally: it is the page new orders land
//! on, so prepending there keeps offsets and counts right. Any other page is
//! refetched instead.

use shared::Order;

use crate::window::PaginationWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New record spliced in, counters updated
    Inserted,
    /// Existing record replaced in place
    Replaced,
    /// Window untouched; the displayed page must be refetched
    RefetchRequired,
    /// Window untouched, nothing else to do
    Ignored,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Replaced)
    }
}

/// Apply a "created" event
pub fn apply_created(window: &mut PaginationWindow, order: Order) -> MergeOutcome {
    // Redelivery, or our own create already settled and counted
    if window.contains(&order.id) {
        window.replace(order);
        return MergeOutcome::Replaced;
    }

    if window.page() != 1 {
        return MergeOutcome::RefetchRequired;
    }

    window.insert_front(order);
    window.increment_total();
    MergeOutcome::Inserted
}

/// Apply an "updated" event; orders outside the window are ignored
pub fn apply_updated(window: &mut PaginationWindow, order: Order) -> MergeOutcome {
    if window.replace(order) {
        MergeOutcome::Replaced
    } else {
        MergeOutcome::Ignored
    }
}
