//! Persistence strategy behind the session store.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::session::{SessionBackendKind, SessionError, SessionRecord};

/// Server-side lifetime used when the cookie is a browser-session cookie.
pub const DEFAULT_SERVER_TTL: Duration = Duration::from_secs(20 * 60);

/// Server-side lifetime of a record saved with the given cookie `max_age`.
pub fn server_ttl(max_age: i64) -> Duration {
    if max_age > 0 {
        Duration::from_secs(max_age as u64)
    } else {
        DEFAULT_SERVER_TTL
    }
}

/// Random 256-bit session id, URL-safe.
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Storage for session records addressed by id.
///
/// Implementations only move records; signing, cookies and the
/// authenticated-session rules live in [`SessionStore`](crate::session::SessionStore).
#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn kind(&self) -> SessionBackendKind;

    /// Fetch a live record; `None` when unknown or expired.
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Store a record that expires after `ttl`.
    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError>;

    /// Remove a record so the id stops authenticating immediately.
    async fn delete(&self, id: &str) -> Result<(), SessionError>;

    /// Issue an id for a session saved for the first time.
    fn issue_id(&self) -> String {
        new_session_id()
    }
}
