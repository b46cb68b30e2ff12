//! Fallback polling while push is unavailable

use std::sync::Arc;
use std::time::Duration;

use shared::OrderQuery;

use super::{Inner, SyncContext, lock};
use crate::error::SyncError;
use crate::task::{Backoff, BackgroundTask, Schedule, Tick};

/// Resource polled by the order window
pub const ORDERS_RESOURCE: &str = "orders";

/// A running poll loop
///
/// Each tick fetches the full page and replaces the window. The loop stops
/// when the task is dropped.
#[derive(Debug)]
pub struct PollingTask {
    pub resource_type: &'static str,
    pub interval: Duration,
    /// Query fetched on each tick
    pub params: OrderQuery,
    pub source_id: String,
    task: BackgroundTask,
}

impl PollingTask {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl SyncContext {
    pub fn is_polling(&self) -> bool {
        lock(&self.inner.tasks).polling.is_some()
    }

    /// Query the polling task currently fetches
    pub fn polling_params(&self) -> Option<OrderQuery> {
        lock(&self.inner.tasks)
            .polling
            .as_ref()
            .map(|p| p.params.clone())
    }
}

impl Inner {
    pub(super) fn start_polling(self: &Arc<Self>, params: OrderQuery) {
        self.start_polling_with(ORDERS_RESOURCE, params, self.config.poll_interval);
    }

    /// Replace any running poll loop; the first fetch happens immediately
    pub(super) fn start_polling_with(
        self: &Arc<Self>,
        resource_type: &'static str,
        params: OrderQuery,
        interval: Duration,
    ) {
        let weak = Arc::downgrade(self);
        let schedule = Schedule::every(interval)
            .immediate()
            .with_backoff(Backoff::exponential(self.config.poll_max_backoff));

        let task = BackgroundTask::periodic("order_polling", schedule, move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return Tick::Stop;
                };
                match inner.poll_once().await {
                    Ok(()) => Tick::Ok,
                    Err(e) => {
                        tracing::warn!(error = %e, "Poll failed");
                        Tick::Failed
                    }
                }
            }
        });

        tracing::info!(
            resource = resource_type,
            page = params.page,
            interval_ms = interval.as_millis() as u64,
            "Polling started"
        );
        let polling = PollingTask {
            resource_type,
            interval,
            params,
            source_id: self.config.source_id.clone(),
            task,
        };
        let previous = lock(&self.tasks).polling.replace(polling);
        drop(previous);
    }

    /// No-op when no poll loop is running
    pub(super) fn stop_polling(&self) {
        let previous = lock(&self.tasks).polling.take();
        if let Some(polling) = previous {
            tracing::info!(resource = polling.resource_type, "Polling stopped");
        }
    }

    /// Point the running poll loop at `query`
    pub(super) fn retarget_polling(&self, query: &OrderQuery) {
        if let Some(polling) = lock(&self.tasks).polling.as_mut()
            && polling.params != *query
        {
            polling.params = query.clone();
            tracing::debug!(page = query.page, "Polling retargeted");
        }
    }

    /// One poll tick: fetch the current query without touching `last_query`
    ///
    /// The query is read from the state at tick time, so a retarget takes
    /// effect on the next tick.
    async fn poll_once(&self) -> Result<(), SyncError> {
        let query = self.last_query();
        let page = self
            .call(self.api.list_orders(&query))
            .await
            .map_err(SyncError::Fetch)?;
        if self.apply_page(&query, page) {
            self.bump();
        }
        Ok(())
    }
}
