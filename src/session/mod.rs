//! Session management subsystem.
//!
//! # Data Flow
//! ```text
//! Request Cookie header
//!     → cookie.rs (find ddns_sid)
//!     → token.rs (verify HMAC, age)
//!     → backend (memory.rs | remote.rs) load record by id
//!     → Session (new when any step fails)
//!
//! Save:
//!     Session → backend save (TTL = max_age) or delete (max_age < 0)
//!     → token.rs sign id → cookie.rs Set-Cookie
//! ```
//!
//! # Design Decisions
//! - Backend selected once at startup and held as `Arc<dyn SessionBackend>`
//! - Signing is shared, so both backends accept exactly the same tokens
//! - Invalid sessions are an expected outcome, never a crash

pub mod backend;
pub mod cookie;
pub mod memory;
pub mod remote;
pub mod store;
pub mod token;
pub mod types;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use backend::SessionBackend;
pub use memory::MemoryBackend;
pub use remote::{KeyValueStore, RedisPool, RemoteBackend};
pub use store::SessionStore;
pub use types::{Session, SessionOptions, SessionRecord, SessionValue, USER_ID_KEY};

/// Name of the session cookie.
pub const COOKIE_NAME: &str = "ddns_sid";

/// Secret used to sign session tokens.
pub const SECRET_KEY: &[u8] = b"DDNS-secret-key";

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No authenticated session: absent, expired, forged, or without a user id.
    #[error("invalid session")]
    Invalid,

    /// The backend could not be reached. The request is unauthenticated.
    #[error("session backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("corrupt session record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid session cookie: {0}")]
    Cookie(String),
}

/// Which persistence strategy backs the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackendKind {
    Memory,
    Redis,
}

impl FromStr for SessionBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(SessionBackendKind::Memory),
            "redis" => Ok(SessionBackendKind::Redis),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for SessionBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionBackendKind::Memory => f.write_str("memory"),
            SessionBackendKind::Redis => f.write_str("redis"),
        }
    }
}
