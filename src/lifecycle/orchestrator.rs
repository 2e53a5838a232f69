//! Process lifecycle orchestrator.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;

use crate::config::LifecycleConfig;
use crate::lifecycle::registry::Registry;
use crate::lifecycle::shutdown::{run_stop_hooks, Shutdown, StopHook, StopList, StopOrder, StopReport};
use crate::lifecycle::startup::{
    plan, HookContext, HookError, HookFailure, HookFuture, HookSpec, StartHook, StartupReport,
};
use crate::lifecycle::{LifecycleError, LifecycleState};
use crate::observability::metrics;

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordered startup and shutdown of interdependent subsystems.
///
/// Start hooks are registered up front and run once, sequentially, by
/// [`run`](Self::run). Stop hooks may be registered at any time (usually by a
/// start hook, right after it acquires something) and run once by
/// [`stop`](Self::stop).
pub struct Lifecycle {
    registry: Arc<Registry>,
    start_hooks: Mutex<Vec<StartHook>>,
    stop_hooks: StopList,
    state: Mutex<LifecycleState>,
    shutdown: Shutdown,
    stop_order: StopOrder,
    stop_timeout: Duration,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            start_hooks: Mutex::new(Vec::new()),
            stop_hooks: StopList::default(),
            state: Mutex::new(LifecycleState::NotStarted),
            shutdown: Shutdown::new(),
            stop_order: StopOrder::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn from_config(config: &LifecycleConfig, stop_order: StopOrder) -> Self {
        Self::new()
            .with_stop_order(stop_order)
            .with_stop_timeout(Duration::from_secs(config.stop_timeout_secs))
    }

    pub fn with_stop_order(mut self, order: StopOrder) -> Self {
        self.stop_order = order;
        self
    }

    /// Default time budget for stop hooks registered without their own.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    pub fn stop_order(&self) -> StopOrder {
        self.stop_order
    }

    /// Receiver notified when [`stop`](Self::stop) begins.
    pub fn shutdown_signal(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Append a start hook with no declared dependencies.
    pub fn register_start<F>(&self, action: F) -> Result<(), LifecycleError>
    where
        F: FnOnce(HookContext) -> HookFuture + Send + 'static,
    {
        let name = {
            let hooks = self.lock_start_hooks();
            (hooks.len()..)
                .map(|n| format!("start-{}", n))
                .find(|candidate| hooks.iter().all(|h| h.spec.name != *candidate))
                .unwrap_or_default()
        };
        self.register_start_with(HookSpec::new(name), action)
    }

    /// Append a start hook with declared registry dependencies.
    pub fn register_start_with<F>(&self, spec: HookSpec, action: F) -> Result<(), LifecycleError>
    where
        F: FnOnce(HookContext) -> HookFuture + Send + 'static,
    {
        let state = self.lock_state();
        if *state != LifecycleState::NotStarted {
            return Err(LifecycleError::StartSealed);
        }
        let mut hooks = self.lock_start_hooks();
        if hooks.iter().any(|h| h.spec.name == spec.name) {
            return Err(LifecycleError::DuplicateHook(spec.name));
        }

        tracing::debug!(
            hook = %spec.name,
            requires = ?spec.requires,
            provides = ?spec.provides,
            "Start hook registered"
        );
        hooks.push(StartHook {
            spec,
            action: Box::new(action),
        });
        Ok(())
    }

    /// Append a stop hook using the default timeout.
    pub fn register_stop<F>(&self, name: impl Into<String>, action: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> HookFuture + Send + 'static,
    {
        self.stop_hooks.push(StopHook::new(name, None, action))
    }

    pub fn register_stop_with_timeout<F>(
        &self,
        name: impl Into<String>,
        timeout: Duration,
        action: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> HookFuture + Send + 'static,
    {
        self.stop_hooks.push(StopHook::new(name, Some(timeout), action))
    }

    /// Execute the start hooks once, in dependency then registration order.
    ///
    /// A hook whose dependency is missing is skipped and the remaining hooks
    /// still run. Only misuse (a second `run`, a dependency cycle) is an error.
    pub async fn run(&self) -> Result<StartupReport, LifecycleError> {
        let (hooks, start_plan) = {
            let mut state = self.lock_state();
            if *state != LifecycleState::NotStarted {
                return Err(LifecycleError::InvalidState {
                    action: "run",
                    state: *state,
                });
            }

            let mut hooks = self.lock_start_hooks();
            let specs: Vec<HookSpec> = hooks.iter().map(|h| h.spec.clone()).collect();
            let start_plan = plan(&specs, |key| self.registry.contains(key))?;

            *state = LifecycleState::Running;
            (std::mem::take(&mut *hooks), start_plan)
        };
        metrics::record_state(LifecycleState::Running);

        tracing::info!(hooks = hooks.len(), "Running start hooks");

        let mut slots: Vec<Option<StartHook>> = hooks.into_iter().map(Some).collect();
        let mut report = StartupReport::default();

        for index in start_plan.order {
            let Some(hook) = slots[index].take() else {
                continue;
            };
            let name = hook.spec.name.clone();

            let missing = start_plan.unsatisfied.get(&index).cloned().or_else(|| {
                hook.spec
                    .requires
                    .iter()
                    .find(|key| !self.registry.contains(key))
                    .map(|key| key.to_string())
            });
            if let Some(key) = missing {
                tracing::error!(hook = %name, key = %key, "Dependency missing, skipping subsystem");
                metrics::record_hook("start", "skipped");
                report.failed.push(HookFailure {
                    hook: name,
                    error: HookError::DependencyMissing { key },
                });
                continue;
            }

            let ctx = HookContext::new(
                name.clone(),
                self.registry.clone(),
                self.stop_hooks.clone(),
                self.shutdown.clone(),
            );

            tracing::debug!(hook = %name, "Running start hook");
            match run_start(hook.action, ctx).await {
                Ok(()) => {
                    for key in &hook.spec.provides {
                        if !self.registry.contains(key) {
                            tracing::warn!(hook = %name, key = %key, "Start hook did not publish a declared key");
                        }
                    }
                    metrics::record_hook("start", "ok");
                    report.started.push(name);
                }
                Err(error) => {
                    tracing::error!(hook = %name, error = %error, "Start hook failed");
                    metrics::record_hook("start", "error");
                    report.failed.push(HookFailure { hook: name, error });
                }
            }
        }

        tracing::info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "Start hooks finished"
        );
        Ok(report)
    }

    /// Execute every registered stop hook once, in the configured order.
    pub async fn stop(&self) -> Result<StopReport, LifecycleError> {
        {
            let mut state = self.lock_state();
            match *state {
                LifecycleState::NotStarted | LifecycleState::Running => {
                    *state = LifecycleState::Stopping;
                    metrics::record_state(LifecycleState::Stopping);
                }
                other => {
                    return Err(LifecycleError::InvalidState {
                        action: "stop",
                        state: other,
                    });
                }
            }
        }

        tracing::info!(
            hooks = self.stop_hooks.len(),
            order = ?self.stop_order,
            "Running stop hooks"
        );
        self.shutdown.trigger();

        let report = run_stop_hooks(&self.stop_hooks, self.stop_order, self.stop_timeout).await;

        *self.lock_state() = LifecycleState::Stopped;
        metrics::record_state(LifecycleState::Stopped);
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Stop hooks finished"
        );
        Ok(report)
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_start_hooks(&self) -> MutexGuard<'_, Vec<StartHook>> {
        self.start_hooks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_start(
    action: Box<dyn FnOnce(HookContext) -> HookFuture + Send>,
    ctx: HookContext,
) -> Result<(), HookError> {
    let future =
        std::panic::catch_unwind(AssertUnwindSafe(move || action(ctx))).map_err(|_| HookError::Panicked)?;

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(HookError::Panicked),
    }
}
