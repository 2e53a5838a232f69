//! Startup orchestration.
//!
//! # Responsibilities
//! - Describe start hooks and the registry keys they require/provide
//! - Resolve a start order before any hook runs
//! - Give each running hook a context for registry access and stop-hook registration
//!
//! # Design Decisions
//! - Order is a stable topological sort: undeclared hooks keep registration order
//! - Unsatisfiable requirements are found at wiring time, not at first use
//! - A failed hook never aborts independent hooks; there is no rollback

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::lifecycle::registry::{Key, Registry, RegistryError};
use crate::lifecycle::shutdown::{Shutdown, StopHook, StopList};
use crate::lifecycle::LifecycleError;

/// Outcome of a single hook.
pub type HookResult = Result<(), HookError>;

/// Future returned by start and stop actions.
pub type HookFuture = BoxFuture<'static, HookResult>;

pub(crate) type StartAction = Box<dyn FnOnce(HookContext) -> HookFuture + Send>;

/// Box an async block as a hook future, fixing its output to [`HookResult`].
pub fn hook<F>(future: F) -> HookFuture
where
    F: Future<Output = HookResult> + Send + 'static,
{
    Box::pin(future)
}

/// Why a hook did not complete.
#[derive(Debug, Error)]
pub enum HookError {
    /// A required registry entry is absent. Recoverable: the hook is skipped.
    #[error("dependency missing: {key}")]
    DependencyMissing { key: String },

    /// Static configuration does not allow this subsystem to start.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Failed(String),

    #[error("hook panicked")]
    Panicked,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl HookError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        HookError::Failed(err.to_string())
    }
}

impl From<RegistryError> for HookError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(key) => HookError::DependencyMissing { key },
            other => HookError::Failed(other.to_string()),
        }
    }
}

impl From<LifecycleError> for HookError {
    fn from(err: LifecycleError) -> Self {
        HookError::Failed(err.to_string())
    }
}

/// A hook that did not complete, with the reason.
#[derive(Debug)]
pub struct HookFailure {
    pub hook: String,
    pub error: HookError,
}

/// Result of [`Lifecycle::run`](crate::lifecycle::Lifecycle::run).
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Hooks that completed, in execution order.
    pub started: Vec<String>,
    /// Hooks that were skipped or returned an error.
    pub failed: Vec<HookFailure>,
}

impl StartupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure(&self, hook: &str) -> Option<&HookError> {
        self.failed.iter().find(|f| f.hook == hook).map(|f| &f.error)
    }
}

/// Declared name and registry dependencies of a start hook.
#[derive(Debug, Clone, Default)]
pub struct HookSpec {
    pub name: String,
    pub requires: Vec<&'static str>,
    pub provides: Vec<&'static str>,
}

impl HookSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn requires<T>(mut self, key: &Key<T>) -> Self {
        self.requires.push(key.name());
        self
    }

    pub fn provides<T>(mut self, key: &Key<T>) -> Self {
        self.provides.push(key.name());
        self
    }
}

pub(crate) struct StartHook {
    pub spec: HookSpec,
    pub action: StartAction,
}

/// Handle given to a running start hook.
#[derive(Clone)]
pub struct HookContext {
    hook: String,
    registry: Arc<Registry>,
    stops: StopList,
    shutdown: Shutdown,
}

impl HookContext {
    pub(crate) fn new(
        hook: String,
        registry: Arc<Registry>,
        stops: StopList,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            hook,
            registry,
            stops,
            shutdown,
        }
    }

    /// Name of the hook this context was created for.
    pub fn hook_name(&self) -> &str {
        &self.hook
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Look up a dependency; a miss becomes [`HookError::DependencyMissing`].
    pub fn get<T>(&self, key: &Key<T>) -> Result<Arc<T>, HookError>
    where
        T: Send + Sync + 'static,
    {
        self.registry.get(key).map_err(|e| {
            tracing::error!(hook = %self.hook, key = key.name(), error = %e, "Dependency lookup failed");
            HookError::from(e)
        })
    }

    /// Publish a value for later hooks.
    pub fn set<T>(&self, key: &Key<T>, value: T) -> Result<Arc<T>, HookError>
    where
        T: Send + Sync + 'static,
    {
        self.registry.set(key, value).map_err(HookError::from)
    }

    /// Pair an acquisition with its release. Uses the lifecycle's default timeout.
    pub fn register_stop<F>(&self, name: impl Into<String>, action: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> HookFuture + Send + 'static,
    {
        self.stops.push(StopHook::new(name, None, action))
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
        self.stops.push(StopHook::new(name, Some(timeout), action))
    }

    /// Receiver notified when the lifecycle begins stopping, for background workers.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }
}

/// Execution order for a set of start hooks.
#[derive(Debug)]
pub(crate) struct StartPlan {
    /// Indices into the registered hook list.
    pub order: Vec<usize>,
    /// Hooks that can never run, with the first key nobody provides.
    pub unsatisfied: HashMap<usize, String>,
}

/// Stable topological ordering of start hooks by their declared keys.
///
/// A requirement counts as unsatisfiable only when the key is not already
/// `present`, no live hook declares it, and no earlier hook without
/// declarations could publish it. Anything else is left to the lookup made
/// when the hook is about to run.
pub(crate) fn plan<P>(specs: &[HookSpec], present: P) -> Result<StartPlan, LifecycleError>
where
    P: Fn(&str) -> bool,
{
    let mut providers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, spec) in specs.iter().enumerate() {
        for key in &spec.provides {
            providers.entry(*key).or_default().push(i);
        }
    }

    // Propagate unsatisfiable requirements to a fixpoint.
    let mut unsatisfied: HashMap<usize, String> = HashMap::new();
    loop {
        let mut changed = false;
        for (i, spec) in specs.iter().enumerate() {
            if unsatisfied.contains_key(&i) {
                continue;
            }
            let undeclared_before = specs[..i]
                .iter()
                .enumerate()
                .any(|(j, s)| s.provides.is_empty() && !unsatisfied.contains_key(&j));
            if undeclared_before {
                continue;
            }
            let missing = spec.requires.iter().find(|key| {
                !present(key)
                    && providers.get(*key).map_or(true, |ps| {
                        ps.iter().all(|p| *p == i || unsatisfied.contains_key(p))
                    })
            });
            if let Some(key) = missing {
                unsatisfied.insert(i, key.to_string());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    let mut indegree = vec![0usize; specs.len()];
    for (i, spec) in specs.iter().enumerate() {
        for key in &spec.requires {
            for &p in providers.get(key).into_iter().flatten() {
                if p != i {
                    dependents[p].push(i);
                    indegree[i] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..specs.len()).filter(|i| indegree[*i] == 0).collect();
    let mut order = Vec::with_capacity(specs.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &d in &dependents[next] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < specs.len() {
        let cycle = (0..specs.len())
            .filter(|i| indegree[*i] > 0)
            .map(|i| specs[i].name.clone())
            .collect();
        return Err(LifecycleError::DependencyCycle(cycle));
    }

    Ok(StartPlan { order, unsatisfied })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, requires: &[&'static str], provides: &[&'static str]) -> HookSpec {
        HookSpec {
            name: name.to_string(),
            requires: requires.to_vec(),
            provides: provides.to_vec(),
        }
    }

    #[test]
    fn test_undeclared_hooks_keep_registration_order() {
        let specs = vec![spec("a", &[], &[]), spec("b", &[], &[]), spec("c", &[], &[])];
        let plan = plan(&specs, |_| false).unwrap();
        assert_eq!(plan.order, vec![0, 1, 2]);
        assert!(plan.unsatisfied.is_empty());
    }

    #[test]
    fn test_provider_moves_before_consumer() {
        let specs = vec![
            spec("web", &["db", "sessions"], &["ws"]),
            spec("sessions", &["db"], &["sessions"]),
            spec("db", &[], &["db"]),
            spec("metrics", &[], &[]),
        ];
        let plan = plan(&specs, |_| false).unwrap();
        assert_eq!(plan.order, vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_missing_provider_is_transitive() {
        let specs = vec![
            spec("dns", &["db"], &["dns"]),
            spec("web", &["dns"], &[]),
            spec("download", &[], &["download"]),
        ];
        let plan = plan(&specs, |_| false).unwrap();
        assert_eq!(plan.unsatisfied.get(&0).map(String::as_str), Some("db"));
        assert_eq!(plan.unsatisfied.get(&1).map(String::as_str), Some("dns"));
        assert!(!plan.unsatisfied.contains_key(&2));
    }

    #[test]
    fn test_key_already_present_is_satisfied() {
        let specs = vec![spec("web", &["db"], &[])];
        let plan = plan(&specs, |key| key == "db").unwrap();
        assert!(plan.unsatisfied.is_empty());
        assert_eq!(plan.order, vec![0]);
    }

    #[test]
    fn test_earlier_undeclared_hook_defers_to_runtime() {
        let specs = vec![
            spec("legacy", &[], &[]),
            spec("web", &["db"], &[]),
        ];
        assert!(plan(&specs, |_| false).unwrap().unsatisfied.is_empty());

        // An undeclared hook registered later cannot run first.
        let specs = vec![
            spec("web", &["db"], &["web"]),
            spec("legacy", &[], &[]),
        ];
        let plan = plan(&specs, |_| false).unwrap();
        assert_eq!(plan.unsatisfied.get(&0).map(String::as_str), Some("db"));
    }

    #[test]
    fn test_cycle_detected() {
        let specs = vec![
            spec("a", &["b"], &["a"]),
            spec("b", &["a"], &["b"]),
            spec("c", &[], &[]),
        ];
        match plan(&specs, |_| false) {
            Err(LifecycleError::DependencyCycle(names)) => {
                assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_miss_maps_to_dependency_missing() {
        let err = HookError::from(RegistryError::NotFound("db".into()));
        assert!(matches!(err, HookError::DependencyMissing { key } if key == "db"));
    }
}
