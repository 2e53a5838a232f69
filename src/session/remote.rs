//! Shared session backend on an external key-value store (Redis).
//!
//! Suitable for multiple instances sharing session state. Records are
//! serialized as JSON under `session_<id>` with a server-managed TTL, and
//! logout deletes the record so the token stops working everywhere at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::config::RedisConfig;
use crate::session::{SessionBackend, SessionBackendKind, SessionError, SessionRecord};

/// Connections kept open to the session store.
pub const POOL_SIZE: usize = 10;

/// Logical database index holding sessions.
pub const DATABASE: i64 = 0;

const KEY_PREFIX: &str = "session_";

const DEFAULT_PORT: u16 = 6379;

/// Minimal key-value contract the remote backend needs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError>;

    /// Store `value` and let the server expire it after `ttl_secs`.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), SessionError>;

    async fn del(&self, key: &str) -> Result<(), SessionError>;
}

/// Round-robin pool of multiplexed Redis connections.
pub struct RedisPool {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
}

impl RedisPool {
    /// Connect to the configured server with [`POOL_SIZE`] connections on [`DATABASE`].
    pub async fn connect(config: &RedisConfig) -> Result<Self, SessionError> {
        Self::connect_with(connection_info(config)?, POOL_SIZE).await
    }

    pub async fn connect_with(info: ConnectionInfo, size: usize) -> Result<Self, SessionError> {
        let client = Client::open(info).map_err(unavailable)?;

        let mut connections = Vec::with_capacity(size);
        for _ in 0..size.max(1) {
            connections.push(ConnectionManager::new(client.clone()).await.map_err(unavailable)?);
        }

        tracing::info!(pool_size = connections.len(), "Redis session pool connected");
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    fn connection(&self) -> ConnectionManager {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].clone()
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    pub async fn ping(&self) -> Result<(), SessionError> {
        let mut conn = self.connection();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisPool {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let mut conn = self.connection();
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(unavailable)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), SessionError> {
        let mut conn = self.connection();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(unavailable)
    }

    async fn del(&self, key: &str) -> Result<(), SessionError> {
        let mut conn = self.connection();
        conn.del::<_, ()>(key).await.map_err(unavailable)
    }
}

fn unavailable(err: redis::RedisError) -> SessionError {
    SessionError::BackendUnavailable(err.to_string())
}

/// Address and credentials for `host[:port]`, always selecting [`DATABASE`].
pub fn connection_info(config: &RedisConfig) -> Result<ConnectionInfo, SessionError> {
    let (host, port) = match config.host.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') => {
            let port = port.parse::<u16>().map_err(|_| {
                SessionError::BackendUnavailable(format!("invalid redis port in {}", config.host))
            })?;
            (host, port)
        }
        _ => (config.host.as_str(), DEFAULT_PORT),
    };

    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.trim_matches(|c| c == '[' || c == ']').to_string(), port),
        redis: RedisConnectionInfo {
            db: DATABASE,
            username: None,
            password: (!config.passwd.is_empty()).then(|| config.passwd.clone()),
        },
    })
}

/// Session backend over any [`KeyValueStore`].
pub struct RemoteBackend {
    store: Arc<dyn KeyValueStore>,
}

impl RemoteBackend {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }
}

#[async_trait]
impl SessionBackend for RemoteBackend {
    fn kind(&self) -> SessionBackendKind {
        SessionBackendKind::Redis
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        match self.store.get(&Self::key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec(record)?;
        self.store
            .set_ex(&Self::key(id), bytes, ttl.as_secs().max(1))
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.store.del(&Self::key(id)).await
    }
}
