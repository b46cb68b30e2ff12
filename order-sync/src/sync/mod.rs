//! Sync context
//!
//! [`SyncContext`] owns one dashboard's view of the orders of a tenant: the
//! pagination window, the push/poll supervisor, the handler registrations
//! and the optimistic mutations in flight. It is built explicitly by its
//! owner and torn down with [`SyncContext::stop`] or by dropping it.
//!
//! All state sits behind short synchronous critical sections; no lock is
//! held across an `.await`.
//!
//! Implementation is split by concern:
//! - `supervisor` - start/stop, push health, event pump
//! - `polling` - fallback polling task
//! - `merge` - applying pushed events to the window
//! - `optimistic` - create/update with rollback

pub mod merge;
mod optimistic;
mod polling;
mod supervisor;

pub use merge::MergeOutcome;
pub use optimistic::{MutationKind, PendingMutation, Snapshot};
pub use polling::{ORDERS_RESOURCE, PollingTask};
pub use supervisor::ConnectionState;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::{Order, OrderPage, OrderQuery, Session};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::{ClientError, ClientResult, SyncError};
use crate::http::{NetworkOrdersApi, OrdersApi};
use crate::push::{MessagePushChannel, PushChannel};
use crate::router::EventRouter;
use crate::task::BackgroundTask;
use crate::window::PaginationWindow;

/// Order synchronization context for one session
pub struct SyncContext {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: SyncConfig,
    api: Arc<dyn OrdersApi>,
    push: Arc<dyn PushChannel>,
    router: Arc<EventRouter>,
    state: Mutex<SyncState>,
    tasks: Mutex<TaskSlots>,
    /// Bumped after every visible state change
    revision: watch::Sender<u64>,
    /// Cancelled by `stop`; scopes detached quiet refetches
    session_token: Mutex<CancellationToken>,
    next_mutation: AtomicU64,
}

struct SyncState {
    window: PaginationWindow,
    connection: ConnectionState,
    /// Loud fetches in flight
    loading: u32,
    last_query: OrderQuery,
    pending: Vec<PendingMutation>,
    tenant_id: Option<String>,
}

#[derive(Default)]
struct TaskSlots {
    health: Option<BackgroundTask>,
    pump: Option<BackgroundTask>,
    polling: Option<PollingTask>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncContext {
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn OrdersApi>,
        push: Arc<dyn PushChannel>,
        session: Session,
    ) -> Self {
        let per_page = config.per_page;
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                api,
                push,
                router: Arc::new(EventRouter::new(session)),
                state: Mutex::new(SyncState {
                    window: PaginationWindow::new(1, per_page),
                    connection: ConnectionState::Disconnected,
                    loading: 0,
                    last_query: OrderQuery::page(1, per_page),
                    pending: Vec::new(),
                    tenant_id: None,
                }),
                tasks: Mutex::new(TaskSlots::default()),
                revision,
                session_token: Mutex::new(CancellationToken::new()),
                next_mutation: AtomicU64::new(1),
            }),
        }
    }

    /// Context talking to the network backend described by `config`
    pub fn from_config(config: SyncConfig, session: Session) -> Result<Self, SyncError> {
        let api = NetworkOrdersApi::new(&config).map_err(|e| SyncError::Config(e.to_string()))?;
        let push = MessagePushChannel::from_config(&config.push)
            .map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(Self::new(config, Arc::new(api), Arc::new(push), session))
    }

    /// Load `query` and replace the window, showing the loading state
    ///
    /// On failure the previous window stays in place.
    pub async fn fetch_page(&self, query: OrderQuery) -> Result<(), SyncError> {
        self.inner.fetch(query, true).await
    }

    /// Like [`fetch_page`](Self::fetch_page) without the loading state
    pub async fn fetch_page_quietly(&self, query: OrderQuery) -> Result<(), SyncError> {
        self.inner.fetch(query, false).await
    }

    /// Quietly reload the last requested query
    pub async fn refresh_quietly(&self) -> Result<(), SyncError> {
        self.inner.refresh_quietly().await
    }

    /// Snapshot of the current window
    pub fn window(&self) -> PaginationWindow {
        lock(&self.inner.state).window.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        lock(&self.inner.state).window.orders().to_vec()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.inner.state).loading > 0
    }

    pub fn last_query(&self) -> OrderQuery {
        self.inner.last_query()
    }

    pub fn tenant_id(&self) -> Option<String> {
        lock(&self.inner.state).tenant_id.clone()
    }

    pub fn pending_mutations(&self) -> Vec<PendingMutation> {
        lock(&self.inner.state).pending.clone()
    }

    /// Running timers (health check and polling)
    pub fn active_timers(&self) -> usize {
        let tasks = lock(&self.inner.tasks);
        usize::from(tasks.health.is_some()) + usize::from(tasks.polling.is_some())
    }

    /// Revision counter, bumped after every visible change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Router for registering additional handlers
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.inner.router
    }

    pub fn source_id(&self) -> &str {
        &self.inner.config.source_id
    }

    pub fn session(&self) -> &Session {
        self.inner.router.session()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl Inner {
    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn connection_state(&self) -> ConnectionState {
        lock(&self.state).connection
    }

    fn last_query(&self) -> OrderQuery {
        lock(&self.state).last_query.clone()
    }

    fn next_mutation_id(&self) -> u64 {
        self.next_mutation.fetch_add(1, Ordering::Relaxed)
    }

    /// Run a backend call bounded by the request timeout
    async fn call<T, F>(&self, request: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, request)
            .await
            .unwrap_or_else(|_| Err(ClientError::Timeout(timeout)))
    }

    async fn fetch(&self, query: OrderQuery, loud: bool) -> Result<(), SyncError> {
        {
            let mut state = lock(&self.state);
            state.last_query = query.clone();
            if loud {
                state.loading += 1;
            }
        }
        self.retarget_polling(&query);
        if loud {
            self.bump();
        }

        let outcome = self.call(self.api.list_orders(&query)).await;

        if loud {
            let mut state = lock(&self.state);
            state.loading = state.loading.saturating_sub(1);
        }
        let result = match outcome {
            Ok(page) => {
                self.apply_page(&query, page);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(page = query.page, error = %e, "Failed to fetch orders");
                Err(SyncError::Fetch(e))
            }
        };
        self.bump();
        result
    }

    async fn refresh_quietly(&self) -> Result<(), SyncError> {
        let query = self.last_query();
        self.fetch(query, false).await
    }

    /// Replace the window wholesale, unless the caller moved to another query meanwhile
    fn apply_page(&self, query: &OrderQuery, page: OrderPage) -> bool {
        let mut state = lock(&self.state);
        if state.last_query != *query {
            tracing::debug!(page = query.page, "Discarding stale page");
            return false;
        }
        state.window = PaginationWindow::from_page(page);
        tracing::debug!(
            page = state.window.page(),
            total_count = state.window.total_count(),
            visible = state.window.len(),
            "Window replaced"
        );
        true
    }

    /// Refetch the displayed page in the background
    ///
    /// Cancelled by `stop`. Without a runtime the refetch is skipped.
    fn spawn_quiet_refetch(self: &Arc<Self>) {
        let token = lock(&self.session_token).clone();
        if token.is_cancelled() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available, skipping quiet refetch");
            return;
        };

        let weak = Arc::downgrade(self);
        handle.spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tokio::select! {
                _ = token.cancelled() => tracing::debug!("Quiet refetch cancelled"),
                result = inner.refresh_quietly() => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Quiet refetch failed");
                    }
                }
            }
        });
    }
}
