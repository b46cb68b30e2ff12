//! Optimistic mutations
//!
//! Local state changes first, the backend call second. A rejected create
//! removes its placeholder; a rejected update restores the snapshot and
//! refetches the page.

use std::fmt;

use chrono::{DateTime, Utc};
use shared::util;
use shared::{Order, OrderDraft, OrderPatch, OrderStatus, StatusFilter};

use super::{Inner, SyncContext, lock};
use crate::error::{ClientResult, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
        }
    }
}

/// Window state of an order before an optimistic update
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub order: Order,
    /// Position in the list
    pub index: usize,
    /// Page the window showed
    pub page: u32,
    /// Whether the update removed the order from the window
    pub removed: bool,
}

/// A mutation awaiting the backend
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub id: u64,
    /// Placeholder id for creates, order id for updates
    pub target_id: String,
    pub kind: MutationKind,
    /// `None` for creates and for updates of orders outside the window
    pub before: Option<Snapshot>,
}

impl SyncContext {
    /// Create an order, showing a placeholder until the backend answers
    ///
    /// The placeholder (`temp-<millis>`) is appended to the list and does not
    /// count towards `total_count`. On success it is replaced in place by the
    /// confirmed order and the count rises by one, unless a push event already
    /// brought that order in, in which case the placeholder is dropped. On
    /// failure it is removed and the error returned.
    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order, SyncError> {
        let inner = &self.inner;
        let (mutation_id, temp_id) = inner.insert_placeholder(&draft);
        inner.bump();

        let result = inner.call(inner.api.create_order(&draft)).await;

        let settled = inner.settle_create(mutation_id, &temp_id, result);
        inner.bump();
        settled
    }

    /// Change an order's status (and optionally pickup time) optimistically
    ///
    /// When `active_filter` no longer matches `status`, the order leaves the
    /// window and `total_count` drops by one. On failure the previous state
    /// is restored, the page is refetched quietly and the error returned.
    pub async fn update_order_status(
        &self,
        id: &str,
        status: OrderStatus,
        pickup_time: Option<DateTime<Utc>>,
        active_filter: Option<&StatusFilter>,
    ) -> Result<(), SyncError> {
        let inner = &self.inner;
        let patch = OrderPatch::status(status).with_pickup_time(pickup_time);
        let mutation_id = inner.apply_local_update(id, status, &patch, active_filter);
        inner.bump();

        match inner.call(inner.api.update_order(id, &patch)).await {
            Ok(confirmed) => {
                inner.settle_update(mutation_id, confirmed);
                inner.bump();
                Ok(())
            }
            Err(source) => {
                tracing::warn!(order_id = %id, error = %source, "Status update rejected, rolling back");
                inner.rollback_update(mutation_id);
                inner.bump();
                if let Err(e) = inner.refresh_quietly().await {
                    tracing::warn!(order_id = %id, error = %e, "Refetch after rollback failed");
                }
                Err(SyncError::Mutation {
                    kind: MutationKind::Update,
                    id: id.to_string(),
                    source,
                })
            }
        }
    }
}

impl Inner {
    fn insert_placeholder(&self, draft: &OrderDraft) -> (u64, String) {
        let mut state = lock(&self.state);

        let mut millis = util::now_millis();
        let temp_id = loop {
            let candidate = util::temp_id(millis);
            let taken = state.window.contains(&candidate)
                || state.pending.iter().any(|p| p.target_id == candidate);
            if !taken {
                break candidate;
            }
            millis += 1;
        };

        state
            .window
            .push_back(Order::placeholder(temp_id.clone(), draft, self.router.session()));
        let mutation_id = self.next_mutation_id();
        state.pending.push(PendingMutation {
            id: mutation_id,
            target_id: temp_id.clone(),
            kind: MutationKind::Create,
            before: None,
        });
        tracing::debug!(temp_id = %temp_id, "Placeholder inserted");
        (mutation_id, temp_id)
    }

    fn settle_create(
        &self,
        mutation_id: u64,
        temp_id: &str,
        result: ClientResult<Order>,
    ) -> Result<Order, SyncError> {
        let mut state = lock(&self.state);
        state.pending.retain(|p| p.id != mutation_id);

        match result {
            Ok(order) => {
                if state.window.contains(&order.id) {
                    // a push event or refetch already listed and counted it
                    state.window.remove(temp_id);
                } else {
                    if !state.window.replace_id(temp_id, order.clone()) {
                        // placeholder lost to a refetch
                        tracing::debug!(temp_id = %temp_id, "Placeholder no longer visible");
                        if state.window.page() == 1 {
                            state.window.insert_front(order.clone());
                        }
                    }
                    // counted here; its push event only replaces it
                    state.window.increment_total();
                }
                tracing::info!(order_id = %order.id, temp_id = %temp_id, "Order created");
                Ok(order)
            }
            Err(source) => {
                state.window.remove(temp_id);
                tracing::warn!(temp_id = %temp_id, error = %source, "Order creation failed, placeholder removed");
                Err(SyncError::Mutation {
                    kind: MutationKind::Create,
                    id: temp_id.to_string(),
                    source,
                })
            }
        }
    }

    fn apply_local_update(
        &self,
        id: &str,
        status: OrderStatus,
        patch: &OrderPatch,
        active_filter: Option<&StatusFilter>,
    ) -> u64 {
        let mut state = lock(&self.state);
        let page = state.window.page();

        let before = match state.window.position(id) {
            Some(index) => {
                let order = state.window.orders()[index].clone();
                let removed = active_filter.is_some_and(|filter| !filter.matches(status));
                if removed {
                    state.window.remove(id);
                    state.window.decrement_total();
                } else if let Some(local) = state.window.get_mut(id) {
                    patch.apply_to(local);
                }
                Some(Snapshot {
                    order,
                    index,
                    page,
                    removed,
                })
            }
            None => {
                tracing::debug!(order_id = %id, "Updating order outside the window");
                None
            }
        };

        let mutation_id = self.next_mutation_id();
        state.pending.push(PendingMutation {
            id: mutation_id,
            target_id: id.to_string(),
            kind: MutationKind::Update,
            before,
        });
        mutation_id
    }

    fn settle_update(&self, mutation_id: u64, confirmed: Order) {
        let mut state = lock(&self.state);
        state.pending.retain(|p| p.id != mutation_id);
        let order_id = confirmed.id.clone();
        if state.window.replace(confirmed) {
            tracing::debug!(order_id = %order_id, "Status update confirmed");
        }
    }

    fn rollback_update(&self, mutation_id: u64) {
        let mut state = lock(&self.state);
        let Some(position) = state.pending.iter().position(|p| p.id == mutation_id) else {
            return;
        };
        let mutation = state.pending.remove(position);
        let Some(snapshot) = mutation.before else {
            return;
        };
        if state.window.page() != snapshot.page {
            return;
        }

        if snapshot.removed {
            if !state.window.contains(&snapshot.order.id) {
                state.window.insert_at(snapshot.index, snapshot.order);
                state.window.increment_total();
            }
        } else {
            state.window.replace(snapshot.order);
        }
    }
}
