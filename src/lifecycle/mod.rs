//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Wiring (startup.rs):
//!     register_start(spec, hook) → plan (topological, stable) → run hooks in order
//!         hook: registry.get(dependency) → build subsystem → registry.set(handle)
//!               → register_stop(release)
//!
//! Registry (registry.rs):
//!     typed keys → shared handles, concurrent reads once subsystems run
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast to workers → stop hooks (LIFO by default) → Exit
//!
//! Signals (signals.rs):
//!     SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Hooks run sequentially on one task; they may spawn their own workers
//! - A missing dependency skips the subsystem, it never aborts startup
//! - Every stop hook runs once under its own timeout

pub mod orchestrator;
pub mod registry;
pub mod shutdown;
pub mod signals;
pub mod startup;

use std::fmt;

use thiserror::Error;

pub use orchestrator::Lifecycle;
pub use registry::{Key, Registry, RegistryError};
pub use shutdown::{Shutdown, StopOrder, StopReport};
pub use startup::{
    hook, HookContext, HookError, HookFailure, HookFuture, HookResult, HookSpec, StartupReport,
};

/// Phase of the process lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::NotStarted => "not started",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Misuse of the orchestrator or an unresolvable wiring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("start hooks cannot be registered once the lifecycle has started")]
    StartSealed,

    #[error("stop hooks cannot be registered once the lifecycle has stopped")]
    StopClosed,

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("dependency cycle between start hooks: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// Hook names identify failures in reports, so they must be unique.
    #[error("a start hook named {0} is already registered")]
    DuplicateHook(String),
}
