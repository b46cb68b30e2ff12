//! Background task handles
//!
//! Every timer and listener the engine owns is a [`BackgroundTask`]: a named
//! tokio task paired with a [`CancellationToken`]. Cancelling or dropping the
//! handle stops the task; panics inside it are caught and logged.
//!
//! # Task kinds
//!
//! - [`TaskKind::Listener`] - event pumps fed by a channel
//! - [`TaskKind::Periodic`] - fixed-interval tickers (health check, polling)

use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Listener,
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Listener => write!(f, "Listener"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

/// Result of one periodic tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Success; the next tick follows after the base interval
    Ok,
    /// Failure; the next tick is delayed by the backoff, if any
    Failed,
    /// Stop the ticker
    Stop,
}

/// Exponential delay after consecutive failed ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max: Duration,
    pub factor: u32,
}

impl Backoff {
    /// Doubling backoff capped at `max`
    pub fn exponential(max: Duration) -> Self {
        Self { max, factor: 2 }
    }

    /// Delay after `failures` consecutive failures
    pub fn delay(&self, base: Duration, failures: u32) -> Duration {
        if failures == 0 {
            return base;
        }
        let exponent = failures.min(16);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        base.saturating_mul(multiplier).min(self.max.max(base))
    }
}

/// When a periodic task ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    /// Run the first tick right away instead of after one interval
    pub immediate: bool,
    pub backoff: Option<Backoff>,
}

impl Schedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            immediate: false,
            backoff: None,
        }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    fn delay_after(&self, failures: u32) -> Duration {
        match self.backoff {
            Some(backoff) => backoff.delay(self.interval, failures),
            None => self.interval,
        }
    }
}

/// Handle to a running background task
///
/// The task is cancelled when the handle is dropped.
pub struct BackgroundTask {
    name: &'static str,
    kind: TaskKind,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn a task that receives its own cancellation token
    pub fn spawn<F, Fut>(name: &'static str, kind: TaskKind, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let future = f(token.clone());

        // Catch panics so a faulty handler does not vanish silently
        let wrapped = async move {
            let result: Result<(), Box<dyn std::any::Any + Send>> =
                AssertUnwindSafe(future).catch_unwind().await;
            match result {
                Ok(()) => tracing::debug!(task = %name, kind = %kind, "Background task finished"),
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(
                        task = %name,
                        kind = %kind,
                        panic = %panic_msg,
                        "Background task panicked"
                    );
                }
            }
        };

        let handle = tokio::spawn(wrapped);
        tracing::debug!(task = %name, kind = %kind, "Spawned background task");
        Self {
            name,
            kind,
            token,
            handle,
        }
    }

    /// Spawn a ticker calling `tick` according to `schedule`
    ///
    /// A tick in flight is abandoned when the task is cancelled.
    pub fn periodic<F, Fut>(name: &'static str, schedule: Schedule, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Tick> + Send + 'static,
    {
        Self::spawn(name, TaskKind::Periodic, move |token| async move {
            if !schedule.immediate {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(schedule.interval) => {}
                }
            }

            let mut failures: u32 = 0;
            loop {
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    outcome = tick() => outcome,
                };

                match outcome {
                    Tick::Ok => failures = 0,
                    Tick::Failed => failures = failures.saturating_add(1),
                    Tick::Stop => break,
                }

                let delay = schedule.delay_after(failures);
                if failures > 0 {
                    tracing::debug!(task = %name, failures, delay_ms = delay.as_millis() as u64, "Tick failed, backing off");
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Token observed by the task
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task (also done on drop)
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

impl fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
