//! Connection supervisor: push first, polling as fallback

use std::fmt;
use std::sync::Arc;

use shared::Order;
use shared::message::BusMessage;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::merge::{self, MergeOutcome};
use super::{Inner, SyncContext, lock};
use crate::push::PushEvent;
use crate::router::EventKind;
use crate::task::{BackgroundTask, Schedule, TaskKind, Tick};

/// Which transport currently feeds the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    ConnectedPush,
    ConnectedPoll,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::ConnectedPush => write!(f, "push"),
            ConnectionState::ConnectedPoll => write!(f, "poll"),
        }
    }
}

impl SyncContext {
    /// Start syncing `tenant_id`
    ///
    /// Tries the push channel first and falls back to polling when it is
    /// unavailable. Transport errors are logged, never returned. Calling it
    /// again restarts the supervisor without duplicating timers or handlers.
    pub async fn start(&self, tenant_id: &str) {
        self.inner.start(tenant_id).await;
    }

    /// Stop every timer, listener and handler of this context
    ///
    /// Synchronous and idempotent; safe to call from inside a handler.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl Inner {
    pub(super) async fn start(self: &Arc<Self>, tenant_id: &str) {
        let source_id = self.config.source_id.clone();

        let (health, pump) = {
            let mut tasks = lock(&self.tasks);
            (tasks.health.take(), tasks.pump.take())
        };
        drop(health);
        drop(pump);

        let token = self.renew_session_token();
        lock(&self.state).tenant_id = Some(tenant_id.to_string());
        self.router.unregister_source(&source_id);
        self.register_handlers();

        // Subscribe before connecting so no frame slips in between
        let events = self.push.subscribe();
        let connected = self.push.connect(tenant_id).await;

        if token.is_cancelled() {
            tracing::debug!(tenant_id = %tenant_id, "Stopped while connecting");
            self.push.disconnect();
            return;
        }

        match connected {
            Ok(()) => {
                self.stop_polling();
                self.set_connection(ConnectionState::ConnectedPush);
                self.spawn_event_pump(events);
                self.spawn_health_check();
                tracing::info!(tenant_id = %tenant_id, source_id = %source_id, "Sync started over push");
            }
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    source_id = %source_id,
                    error = %e,
                    "Push unavailable, falling back to polling"
                );
                self.set_connection(ConnectionState::ConnectedPoll);
                let query = self.last_query();
                self.start_polling(query);
                self.spawn_health_check();
            }
        }
    }

    pub(super) fn stop(&self) {
        let (health, pump, polling) = {
            let mut tasks = lock(&self.tasks);
            (tasks.health.take(), tasks.pump.take(), tasks.polling.take())
        };
        let had_tasks = health.is_some() || pump.is_some() || polling.is_some();
        drop(health);
        drop(pump);
        drop(polling);

        lock(&self.session_token).cancel();
        self.router.unregister_source(&self.config.source_id);
        self.push.disconnect();

        let previous = std::mem::replace(
            &mut lock(&self.state).connection,
            ConnectionState::Disconnected,
        );
        if had_tasks || previous != ConnectionState::Disconnected {
            tracing::info!(source_id = %self.config.source_id, "Sync stopped");
            self.bump();
        }
    }

    fn renew_session_token(&self) -> CancellationToken {
        let mut token = lock(&self.session_token);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    pub(super) fn set_connection(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut lock(&self.state).connection, next);
        if previous != next {
            tracing::info!(from = %previous, state = %next, "Connection state changed");
            self.bump();
        }
    }

    fn register_handlers(self: &Arc<Self>) {
        let source_id = self.config.source_id.clone();

        let weak = Arc::downgrade(self);
        self.router
            .register(EventKind::OrderCreated, source_id.clone(), move |order| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_order_created(order);
                }
            });

        let weak = Arc::downgrade(self);
        self.router
            .register(EventKind::OrderUpdated, source_id, move |order| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_order_updated(order);
                }
            });
    }

    fn on_order_created(self: &Arc<Self>, order: &Order) {
        let outcome = merge::apply_created(&mut lock(&self.state).window, order.clone());
        tracing::debug!(order_id = %order.id, outcome = ?outcome, "Order created event");
        match outcome {
            MergeOutcome::RefetchRequired => self.spawn_quiet_refetch(),
            outcome if outcome.changed() => self.bump(),
            _ => {}
        }
    }

    fn on_order_updated(&self, order: &Order) {
        let outcome = merge::apply_updated(&mut lock(&self.state).window, order.clone());
        tracing::debug!(order_id = %order.id, outcome = ?outcome, "Order updated event");
        if outcome.changed() {
            self.bump();
        }
    }

    /// Forward push frames to the router
    fn spawn_event_pump(self: &Arc<Self>, mut events: broadcast::Receiver<BusMessage>) {
        let weak = Arc::downgrade(self);
        let task = BackgroundTask::spawn("order_event_pump", TaskKind::Listener, move |token| async move {
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => break,
                    received = events.recv() => received,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };

                match received {
                    Ok(msg) => {
                        if let Some(event) = PushEvent::from_bus_message(&msg) {
                            let delivered = inner.router.route(&event);
                            tracing::trace!(event = %event.kind, order_id = %event.order.id, delivered, "Push event routed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Push events dropped, refetching page");
                        inner.spawn_quiet_refetch();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Push event stream closed");
                        break;
                    }
                }
            }
        });

        let previous = lock(&self.tasks).pump.replace(task);
        drop(previous);
    }

    fn spawn_health_check(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let schedule = Schedule::every(self.config.health_check_interval);
        let task = BackgroundTask::periodic("push_health_check", schedule, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        inner.check_push_health().await;
                        Tick::Ok
                    }
                    None => Tick::Stop,
                }
            }
        });

        let previous = lock(&self.tasks).health.replace(task);
        drop(previous);
    }

    /// One health sample: switch transports on a connectivity change
    ///
    /// A context that never had a push session (the initial connect failed)
    /// retries the connect on each sample while it polls.
    pub(super) async fn check_push_health(self: &Arc<Self>) {
        let connected = self.push.is_connected();
        match (self.connection_state(), connected) {
            (ConnectionState::ConnectedPush, false) => {
                tracing::warn!("Push connection lost, falling back to polling");
                self.set_connection(ConnectionState::ConnectedPoll);
                let query = self.last_query();
                self.start_polling(query);
            }
            (ConnectionState::ConnectedPoll, true) => {
                tracing::info!("Push connection restored, stopping polling");
                self.resume_push(None);
            }
            (ConnectionState::ConnectedPoll, false) if !self.has_event_pump() => {
                self.retry_push().await;
            }
            _ => {}
        }
    }

    fn has_event_pump(&self) -> bool {
        lock(&self.tasks).pump.is_some()
    }

    async fn retry_push(self: &Arc<Self>) {
        let Some(tenant_id) = lock(&self.state).tenant_id.clone() else {
            return;
        };
        let token = lock(&self.session_token).clone();

        let events = self.push.subscribe();
        match self.push.connect(&tenant_id).await {
            Ok(()) if token.is_cancelled() => self.push.disconnect(),
            Ok(()) => {
                tracing::info!(tenant_id = %tenant_id, "Push channel available, stopping polling");
                self.resume_push(Some(events));
            }
            Err(e) => tracing::debug!(tenant_id = %tenant_id, error = %e, "Push still unavailable"),
        }
    }

    /// Hand the window back to push, starting the event pump if none runs
    fn resume_push(self: &Arc<Self>, events: Option<broadcast::Receiver<BusMessage>>) {
        self.stop_polling();
        let events = match events {
            Some(events) => Some(events),
            None if !self.has_event_pump() => Some(self.push.subscribe()),
            None => None,
        };
        if let Some(events) = events {
            self.spawn_event_pump(events);
        }
        self.set_connection(ConnectionState::ConnectedPush);
    }
}
