//! Fixed-interval refresh for data that is not pushed over the live connection.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Interval used by views that do not pick their own.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct PollTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs a refresh function immediately and then every `interval`.
///
/// Refresh errors and panics are logged and swallowed; they never stop the
/// schedule. Each tick starts its refresh on a task of its own, so a slow or
/// hung refresh never delays the ticks after it.
///
/// ```rust,ignore
/// let mut poller = Poller::spawn(Duration::from_secs(3), move || {
///     let api = api.clone();
///     async move {
///         let rooms: Vec<Room> = api.get_json("/api/rooms/mine").await?;
///         store.replace(rooms);
///         Ok(())
///     }
/// });
/// // on teardown
/// poller.stop();
/// ```
pub struct Poller {
    interval: Duration,
    refresh: RefreshFn,
    timer: Option<PollTimer>,
}

impl Poller {
    /// Create a stopped poller.
    pub fn new<F, Fut>(interval: Duration, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            refresh: Arc::new(move || refresh().boxed()),
            timer: None,
        }
    }

    /// Create and start a poller.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(interval: Duration, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut poller = Self::new(interval, refresh);
        poller.start();
        poller
    }

    /// Start firing. No-op if already started.
    pub fn start(&mut self) {
        if self.timer.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(self.interval, self.refresh.clone(), cancel.clone()));
        self.timer = Some(PollTimer { cancel, handle });
    }

    /// Stop firing. In-flight refreshes complete; no new one starts.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// The task driving the schedule, while started.
    pub fn timer(&self) -> Option<&JoinHandle<()>> {
        self.timer.as_ref().map(|t| &t.handle)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(period: Duration, refresh: RefreshFn, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(_) = in_flight.join_next() => {}
            _ = ticker.tick() => {
                in_flight.spawn(refresh_once(refresh.clone()));
            }
        }
    }

    // Stopping never aborts a refresh that already started.
    in_flight.detach_all();
}

async fn refresh_once(refresh: RefreshFn) {
    match AssertUnwindSafe(async move { refresh().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %format!("{e:#}"), "poll refresh failed"),
        Err(_) => tracing::warn!("poll refresh panicked"),
    }
}
