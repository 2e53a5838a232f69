//! Shutdown coordination.
//!
//! Stop hooks release what start hooks acquired. Each runs exactly once,
//! under its own timeout, and a failing hook never keeps the others from
//! running.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::broadcast;

use crate::lifecycle::startup::{HookError, HookFailure, HookFuture};
use crate::lifecycle::LifecycleError;
use crate::observability::metrics;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Order in which stop hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopOrder {
    /// Reverse registration: dependents are released before what they depend on.
    #[default]
    Lifo,
    /// Registration order.
    Fifo,
}

impl FromStr for StopOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lifo" => Ok(StopOrder::Lifo),
            "fifo" => Ok(StopOrder::Fifo),
            other => Err(other.to_string()),
        }
    }
}

pub(crate) type StopAction = Box<dyn FnOnce() -> HookFuture + Send>;

pub(crate) struct StopHook {
    name: String,
    timeout: Option<Duration>,
    action: StopAction,
}

impl StopHook {
    pub(crate) fn new<F>(name: impl Into<String>, timeout: Option<Duration>, action: F) -> Self
    where
        F: FnOnce() -> HookFuture + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout,
            action: Box::new(action),
        }
    }
}

#[derive(Default)]
struct StopListInner {
    hooks: Vec<StopHook>,
    closed: bool,
}

/// Append-only list of stop hooks shared with running start hooks.
#[derive(Clone, Default)]
pub(crate) struct StopList {
    inner: Arc<Mutex<StopListInner>>,
}

impl StopList {
    pub(crate) fn push(&self, hook: StopHook) -> Result<(), LifecycleError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.closed {
            return Err(LifecycleError::StopClosed);
        }
        tracing::debug!(hook = %hook.name, "Stop hook registered");
        inner.hooks.push(hook);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).hooks.len()
    }

    /// Take everything registered so far; closes the list once it is empty.
    fn drain_or_close(&self) -> Vec<StopHook> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.hooks.is_empty() {
            inner.closed = true;
        }
        std::mem::take(&mut inner.hooks)
    }
}

/// Result of [`Lifecycle::stop`](crate::lifecycle::Lifecycle::stop).
#[derive(Debug, Default)]
pub struct StopReport {
    /// Hooks that returned successfully, in execution order.
    pub completed: Vec<String>,
    /// Hooks that errored, panicked or exceeded their timeout.
    pub failed: Vec<HookFailure>,
}

impl StopReport {
    /// Every hook that ran, successful or not, in execution order.
    pub fn executed(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Run every hook in `list`, including hooks registered while stopping.
pub(crate) async fn run_stop_hooks(
    list: &StopList,
    order: StopOrder,
    default_timeout: Duration,
) -> StopReport {
    let mut report = StopReport::default();

    loop {
        let mut batch = list.drain_or_close();
        if batch.is_empty() {
            break;
        }
        if order == StopOrder::Lifo {
            batch.reverse();
        }

        for hook in batch {
            let timeout = hook.timeout.unwrap_or(default_timeout);
            tracing::debug!(hook = %hook.name, timeout = ?timeout, "Running stop hook");

            match run_one(hook.action, timeout).await {
                Ok(()) => {
                    metrics::record_hook("stop", "ok");
                    report.completed.push(hook.name);
                }
                Err(error) => {
                    tracing::error!(hook = %hook.name, error = %error, "Stop hook failed");
                    metrics::record_hook("stop", "error");
                    report.failed.push(HookFailure {
                        hook: hook.name,
                        error,
                    });
                }
            }
        }
    }

    report
}

async fn run_one(action: StopAction, timeout: Duration) -> Result<(), HookError> {
    let future = std::panic::catch_unwind(AssertUnwindSafe(action)).map_err(|_| HookError::Panicked)?;

    match tokio::time::timeout(timeout, AssertUnwindSafe(future).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(HookError::Panicked),
        Err(_) => Err(HookError::TimedOut(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &str) -> StopHook {
        let log = log.clone();
        let entry = name.to_string();
        StopHook::new(name, None, move || {
            Box::pin(async move {
                log.lock().unwrap().push(entry);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_lifo_reverses_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = StopList::default();
        for name in ["db", "dns", "web"] {
            list.push(recording(&log, name)).unwrap();
        }

        let report = run_stop_hooks(&list, StopOrder::Lifo, Duration::from_secs(1)).await;

        assert_eq!(*log.lock().unwrap(), vec!["web", "dns", "db"]);
        assert_eq!(report.completed, vec!["web", "dns", "db"]);
    }

    #[tokio::test]
    async fn test_fifo_keeps_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = StopList::default();
        for name in ["db", "dns", "web"] {
            list.push(recording(&log, name)).unwrap();
        }

        run_stop_hooks(&list, StopOrder::Fifo, Duration::from_secs(1)).await;

        assert_eq!(*log.lock().unwrap(), vec!["db", "dns", "web"]);
    }

    #[tokio::test]
    async fn test_timeout_does_not_block_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = StopList::default();
        list.push(recording(&log, "first")).unwrap();
        list.push(StopHook::new("stuck", Some(Duration::from_millis(50)), || {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
        }))
        .unwrap();
        list.push(recording(&log, "last")).unwrap();

        let report = run_stop_hooks(&list, StopOrder::Fifo, Duration::from_secs(1)).await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "last"]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].error, HookError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_panicking_hook_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = StopList::default();
        list.push(StopHook::new("boom", None, || -> HookFuture {
            panic!("release failed")
        }))
        .unwrap();
        list.push(recording(&log, "after")).unwrap();

        let report = run_stop_hooks(&list, StopOrder::Fifo, Duration::from_secs(1)).await;

        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        assert!(matches!(report.failed[0].error, HookError::Panicked));
    }

    #[tokio::test]
    async fn test_hook_registered_while_stopping_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = StopList::default();
        list.push(recording(&log, "db")).unwrap();

        let (l, late_list) = (log.clone(), list.clone());
        list.push(StopHook::new("web", None, move || {
            Box::pin(async move {
                l.lock().unwrap().push("web".to_string());
                late_list
                    .push(recording(&l, "flush"))
                    .map_err(HookError::failed)?;
                Ok(())
            })
        }))
        .unwrap();

        let report = run_stop_hooks(&list, StopOrder::Lifo, Duration::from_secs(1)).await;

        assert_eq!(*log.lock().unwrap(), vec!["web", "db", "flush"]);
        assert_eq!(report.completed, vec!["web", "db", "flush"]);
        assert!(report.failed.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[tokio::test]
    async fn test_list_closes_after_drain() {
        let list = StopList::default();
        run_stop_hooks(&list, StopOrder::Lifo, Duration::from_secs(1)).await;

        let late = StopHook::new("late", None, || Box::pin(async { Ok(()) }));
        assert_eq!(list.push(late).unwrap_err(), LifecycleError::StopClosed);
    }

    #[test]
    fn test_stop_order_parse() {
        assert_eq!("LIFO".parse::<StopOrder>(), Ok(StopOrder::Lifo));
        assert_eq!("fifo".parse::<StopOrder>(), Ok(StopOrder::Fifo));
        assert!("random".parse::<StopOrder>().is_err());
    }
}
