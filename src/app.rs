//! Subsystem wiring.
//!
//! ```text
//! config ──▶ sessions ──▶ web
//! ```
//!
//! Each subsystem is a start hook that declares what it reads from and
//! publishes to the registry, and pairs every resource it acquires with a
//! stop hook.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;

use crate::config::DdnsConfig;
use crate::http::{Credentials, WebServer, WebState};
use crate::lifecycle::{hook, HookContext, HookError, HookResult, HookSpec, Key, Lifecycle, LifecycleError};
use crate::observability::diagnostics::Diagnostics;
use crate::session::{
    KeyValueStore, MemoryBackend, RedisPool, RemoteBackend, SessionBackend, SessionBackendKind,
    SessionOptions, SessionStore,
};

pub const CONFIG: Key<DdnsConfig> = Key::new("config");
pub const SESSIONS: Key<SessionStore> = Key::new("sessions");
/// Address the web server actually bound, which differs from the configured one for port 0.
pub const WEB_ADDR: Key<SocketAddr> = Key::new("web.addr");

/// Register every subsystem's start hook on `lifecycle`.
pub fn register_subsystems(lifecycle: &Lifecycle, config: DdnsConfig) -> Result<(), LifecycleError> {
    let enable_web = config.server.enable_web;

    lifecycle.register_start_with(HookSpec::new("config").provides(&CONFIG), move |ctx| {
        hook(async move {
            ctx.set(&CONFIG, config)?;
            Ok(())
        })
    })?;

    lifecycle.register_start_with(
        HookSpec::new("sessions").requires(&CONFIG).provides(&SESSIONS),
        |ctx| hook(start_sessions(ctx)),
    )?;

    if enable_web {
        lifecycle.register_start_with(
            HookSpec::new("web")
                .requires(&CONFIG)
                .requires(&SESSIONS)
                .provides(&WEB_ADDR),
            |ctx| hook(start_web(ctx)),
        )?;
    } else {
        tracing::info!("Web interface disabled");
    }

    Ok(())
}

async fn start_sessions(ctx: HookContext) -> HookResult {
    let config = ctx.get(&CONFIG)?;
    let kind = config
        .session_backend()
        .map_err(|e| HookError::Config(e.to_string()))?;

    let backend: Arc<dyn SessionBackend> = match kind {
        SessionBackendKind::Memory => {
            let memory = Arc::new(MemoryBackend::new());
            let sweeper = memory.clone().spawn_sweeper(
                Duration::from_secs(config.session.sweep_interval_secs),
                ctx.shutdown_signal(),
            );
            ctx.register_stop("session-sweeper", move || {
                hook(async move { sweeper.await.map_err(HookError::failed) })
            })?;
            memory
        }
        SessionBackendKind::Redis => {
            let pool = RedisPool::connect(&config.redis)
                .await
                .map_err(HookError::failed)?;
            pool.ping().await.map_err(HookError::failed)?;
            tracing::info!(host = %config.redis.host, pool_size = pool.size(), "Redis session backend ready");
            remote_backend(&ctx, Arc::new(pool))?
        }
    };

    let store = SessionStore::new(backend, SessionOptions::with_max_age(config.session.maxage));
    ctx.set(&SESSIONS, store)?;
    tracing::info!(backend = %kind, max_age = config.session.maxage, "Session store ready");
    Ok(())
}

/// Wrap `kv` in a session backend and release it on stop.
fn remote_backend(
    ctx: &HookContext,
    kv: Arc<dyn KeyValueStore>,
) -> Result<Arc<dyn SessionBackend>, HookError> {
    let backend = Arc::new(RemoteBackend::new(kv.clone()));
    ctx.register_stop("redis-pool", move || {
        hook(async move {
            drop(kv);
            tracing::info!("Redis session pool released");
            Ok(())
        })
    })?;
    Ok(backend)
}

/// Start the debug captures and wait for both on stop.
pub fn register_diagnostics(lifecycle: &Lifecycle, diagnostics: Diagnostics) -> Result<(), LifecycleError> {
    let (cpu, memory) = diagnostics.spawn(lifecycle.shutdown_signal());
    lifecycle.register_stop("diagnostics", move || {
        hook(async move {
            cpu.await.map_err(HookError::failed)?;
            memory.await.map_err(HookError::failed)
        })
    })
}

async fn start_web(ctx: HookContext) -> HookResult {
    let config = ctx.get(&CONFIG)?;
    let sessions = ctx.get(&SESSIONS)?;

    if config.web.admin.is_empty() || config.web.passwd.is_empty() {
        return Err(HookError::Config(
            "web.admin and web.passwd must be set to enable the web interface".into(),
        ));
    }

    let listener = TcpListener::bind(&config.web.bind_address)
        .await
        .map_err(HookError::failed)?;
    let addr = listener.local_addr().map_err(HookError::failed)?;

    let state = WebState {
        sessions,
        credentials: Arc::new(Credentials {
            admin: config.web.admin.clone(),
            passwd: config.web.passwd.clone(),
        }),
        started_at: Instant::now(),
    };
    let server = WebServer::new(&config.web, state);
    let handle = tokio::spawn(server.run(listener, ctx.shutdown_signal()));

    ctx.register_stop("web", move || {
        hook(async move {
            handle
                .await
                .map_err(HookError::failed)?
                .map_err(HookError::failed)
        })
    })?;
    ctx.set(&WEB_ADDR, addr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sessions_without_web() {
        let mut config = DdnsConfig::default();
        config.server.enable_web = false;

        let lifecycle = Lifecycle::new();
        register_subsystems(&lifecycle, config).unwrap();
        let report = lifecycle.run().await.unwrap();

        assert_eq!(report.started, vec!["config", "sessions"]);
        let store = lifecycle.registry().get(&SESSIONS).unwrap();
        assert_eq!(store.backend_kind(), SessionBackendKind::Memory);

        let stopped = lifecycle.stop().await.unwrap();
        assert_eq!(stopped.completed, vec!["session-sweeper"]);
    }

    #[tokio::test]
    async fn test_web_requires_credentials() {
        let mut config = DdnsConfig::default();
        config.web.bind_address = "127.0.0.1:0".into();

        let lifecycle = Lifecycle::new();
        register_subsystems(&lifecycle, config).unwrap();
        let report = lifecycle.run().await.unwrap();

        assert!(matches!(report.failure("web"), Some(HookError::Config(_))));
        assert!(!lifecycle.registry().contains(WEB_ADDR.name()));
        lifecycle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_backend_released_on_stop() {
        struct NullKv;

        #[async_trait::async_trait]
        impl KeyValueStore for NullKv {
            async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, crate::session::SessionError> {
                Ok(None)
            }

            async fn set_ex(
                &self,
                _key: &str,
                _value: Vec<u8>,
                _ttl_secs: u64,
            ) -> Result<(), crate::session::SessionError> {
                Ok(())
            }

            async fn del(&self, _key: &str) -> Result<(), crate::session::SessionError> {
                Ok(())
            }
        }

        let kv: Arc<dyn KeyValueStore> = Arc::new(NullKv);
        let lifecycle = Lifecycle::new();
        let shared = kv.clone();
        lifecycle
            .register_start_with(HookSpec::new("sessions").provides(&SESSIONS), move |ctx| {
                hook(async move {
                    let backend = remote_backend(&ctx, shared)?;
                    assert_eq!(backend.kind(), SessionBackendKind::Redis);
                    Ok(())
                })
            })
            .unwrap();

        lifecycle.run().await.unwrap();
        assert_eq!(Arc::strong_count(&kv), 2);

        let stopped = lifecycle.stop().await.unwrap();
        assert_eq!(stopped.completed, vec!["redis-pool"]);
        assert_eq!(Arc::strong_count(&kv), 1);
    }

    #[tokio::test]
    async fn test_diagnostics_joined_on_stop() {
        let dir = std::env::temp_dir().join(format!("ddns-app-diag-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let lifecycle = Lifecycle::new();
        lifecycle.run().await.unwrap();
        register_diagnostics(
            &lifecycle,
            Diagnostics {
                dir: dir.clone(),
                cpu_window: Duration::from_secs(60),
                sample_interval: Duration::from_millis(50),
                memory_delay: Duration::from_secs(60),
            },
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stopped = lifecycle.stop().await.unwrap();
        assert_eq!(stopped.completed, vec!["diagnostics"]);
        // The CPU capture has flushed by the time stop returns.
        assert!(dir.join(crate::observability::diagnostics::CPU_PROFILE_FILE).exists());

        let _ = std::fs::remove_dir_all(dir);
    }
}
